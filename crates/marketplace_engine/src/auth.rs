use serde::Deserialize;
use serde_json::json;

use marketplace_logging::market_info;

use crate::transport::ApiRequest;
use crate::{ApiClient, ApiError, Credential};

pub const LOGIN_PATH: &str = "/auth/login";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl ApiClient {
    /// Exchanges email and password for a credential and stores it.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(LOGIN_PATH)
            .with_json(json!({ "email": email, "password": password }))
            .without_renewal();
        let envelope = self.send::<LoginData>(request).await?;
        self.credentials().set(Some(Credential {
            access_token: envelope.data.token,
            refresh_token: envelope.data.refresh_token,
        }));
        market_info!("Signed in");
        Ok(())
    }

    /// Forgets the stored credential. No server call is made.
    pub fn sign_out(&self) {
        self.credentials().clear();
        market_info!("Signed out");
    }
}
