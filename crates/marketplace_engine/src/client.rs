use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::classify::{classify_status, decode_envelope};
use crate::credentials::CredentialStore;
use crate::middleware::{LoggingMiddleware, Middleware, Next};
use crate::reauth::{AuthMiddleware, RefreshFlow, SignOutHook};
use crate::transport::{
    ApiRequest, ClientSettings, RawResponse, ReqwestTransport, Transport, UploadPart,
};
use crate::{ApiError, Envelope, ErrorKind};

struct ClientInner {
    middleware: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    flow: RefreshFlow,
}

/// HTTP access core. Built once at startup and cloned into every consumer.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

pub struct ApiClientBuilder {
    settings: ClientSettings,
    store: CredentialStore,
    transport: Option<Arc<dyn Transport>>,
    middleware: Vec<Arc<dyn Middleware>>,
    on_sign_out: Option<SignOutHook>,
}

impl ApiClientBuilder {
    /// Replaces the reqwest transport, e.g. with a test double.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Appends a middleware between logging and authentication.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Called once whenever renewal fails and the session is cleared.
    pub fn on_sign_out(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_sign_out = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.settings)?),
        };
        let flow = RefreshFlow::new(self.store.clone(), transport.clone(), self.on_sign_out);

        let mut middleware: Vec<Arc<dyn Middleware>> = Vec::with_capacity(self.middleware.len() + 2);
        middleware.push(Arc::new(LoggingMiddleware));
        middleware.extend(self.middleware);
        middleware.push(Arc::new(AuthMiddleware::new(self.store.clone(), flow.clone())));

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                middleware,
                transport,
                store: self.store,
                flow,
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(settings: ClientSettings, store: CredentialStore) -> ApiClientBuilder {
        ApiClientBuilder {
            settings,
            store,
            transport: None,
            middleware: Vec::new(),
            on_sign_out: None,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn refresh_flow(&self) -> &RefreshFlow {
        &self.inner.flow
    }

    /// Runs the request through the chain. Non-2xx statuses become classified errors.
    pub async fn execute(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let next = Next::new(&self.inner.middleware, self.inner.transport.as_ref());
        let response = next.run(request).await?;
        if !response.is_success() {
            return Err(classify_status(response.status, &response.body));
        }
        Ok(response)
    }

    pub async fn send<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Envelope<T>, ApiError> {
        let response = self.execute(request).await?;
        decode_envelope(response.status, &response.body)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Envelope<T>, ApiError> {
        self.send(ApiRequest::get(path).with_query(query.to_vec()))
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.send(ApiRequest::new(Method::POST, path).with_json(to_json(body)?))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.send(ApiRequest::new(Method::PUT, path).with_json(to_json(body)?))
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.send(ApiRequest::new(Method::PATCH, path).with_json(to_json(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.send(ApiRequest::new(Method::DELETE, path)).await
    }

    /// Multipart POST.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<UploadPart>,
    ) -> Result<Envelope<T>, ApiError> {
        self.send(ApiRequest::new(Method::POST, path).with_parts(parts))
            .await
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|err| ApiError::new(ErrorKind::Unknown, err.to_string()))
}
