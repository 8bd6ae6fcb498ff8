use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use marketplace_logging::{market_debug, market_info, market_warn, redact_token};
use serde::Deserialize;
use serde_json::json;

use crate::classify::{classify_status, decode_envelope};
use crate::credentials::CredentialStore;
use crate::middleware::{Middleware, Next};
use crate::transport::{ApiRequest, RawResponse, Transport};
use crate::{ApiError, Credential};

pub const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    SignedOut,
}

pub type SignOutHook = Arc<dyn Fn() + Send + Sync>;

type Exchange = Shared<BoxFuture<'static, Result<Credential, ApiError>>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

struct FlowInner {
    store: CredentialStore,
    transport: Arc<dyn Transport>,
    phase: Mutex<RefreshPhase>,
    in_flight: Mutex<Option<Exchange>>,
    on_sign_out: Option<SignOutHook>,
}

/// Single-flight credential renewal.
///
/// Concurrent callers share one exchange, which runs to completion on its own task.
/// Whoever arrives after it finished sees the renewed credential in the store and replays
/// without a second exchange.
#[derive(Clone)]
pub struct RefreshFlow {
    inner: Arc<FlowInner>,
}

impl RefreshFlow {
    pub fn new(
        store: CredentialStore,
        transport: Arc<dyn Transport>,
        on_sign_out: Option<SignOutHook>,
    ) -> Self {
        let inner = Arc::new(FlowInner {
            store: store.clone(),
            transport,
            phase: Mutex::new(RefreshPhase::Idle),
            in_flight: Mutex::new(None),
            on_sign_out,
        });

        // A fresh sign-in re-arms renewal after a sign-out.
        let weak = Arc::downgrade(&inner);
        store.on_change(move |credential| {
            if credential.is_none() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                let mut phase = inner.phase.lock().unwrap_or_else(PoisonError::into_inner);
                if *phase == RefreshPhase::SignedOut {
                    *phase = RefreshPhase::Idle;
                }
            }
        });

        Self { inner }
    }

    pub fn phase(&self) -> RefreshPhase {
        *self
            .inner
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a credential newer than `stale_token`, running or joining the exchange.
    pub async fn renew(&self, stale_token: &str) -> Result<Credential, ApiError> {
        let exchange = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match self.inner.store.get() {
                None => return Err(ApiError::session_expired()),
                Some(current) if current.access_token != stale_token => {
                    market_debug!("Credential already renewed, replaying");
                    return Ok(current);
                }
                Some(_) => {}
            }
            match in_flight.as_ref() {
                Some(exchange) => {
                    market_debug!("Joining in-flight credential renewal");
                    exchange.clone()
                }
                None => {
                    let exchange = self.spawn_exchange();
                    *in_flight = Some(exchange.clone());
                    exchange
                }
            }
        };
        exchange.await
    }

    /// Clears the store and notifies the sign-out hook on the transition into `SignedOut`.
    pub fn sign_out(&self) {
        self.inner.sign_out();
    }

    /// Runs the exchange on its own task so it completes even when every waiting caller
    /// is dropped. Called with `in_flight` held.
    fn spawn_exchange(&self) -> Exchange {
        let task = tokio::spawn(FlowInner::exchange(self.inner.clone()));
        let inner = self.inner.clone();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    market_warn!("Credential renewal task failed: {}", err);
                    inner
                        .in_flight
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    inner.sign_out();
                    Err(ApiError::session_expired())
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl FlowInner {
    async fn exchange(self: Arc<Self>) -> Result<Credential, ApiError> {
        self.set_phase(RefreshPhase::Refreshing);
        market_info!("Access credential rejected, renewing");

        let outcome = self.request_credential().await;

        // The result is published and the exchange retired under one lock, so a caller
        // holding the renewed token never joins this finished exchange.
        let ended_session = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.take();
            match &outcome {
                Ok(credential) => {
                    self.store.set(Some(credential.clone()));
                    self.set_phase(RefreshPhase::Idle);
                    market_info!(
                        "Credential renewed ({})",
                        redact_token(&credential.access_token)
                    );
                    false
                }
                Err(err) => {
                    market_warn!("Credential renewal failed: {}", err);
                    self.end_session()
                }
            }
        };
        if ended_session {
            self.notify_sign_out();
        }
        outcome.map_err(|_| ApiError::session_expired())
    }

    async fn request_credential(&self) -> Result<Credential, ApiError> {
        let refresh_token = self
            .store
            .get()
            .and_then(|credential| credential.refresh_token)
            .ok_or_else(ApiError::session_expired)?;

        let request = ApiRequest::post(REFRESH_PATH)
            .with_json(json!({ "refreshToken": refresh_token }))
            .without_renewal();
        let response: RawResponse = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(classify_status(response.status, &response.body));
        }

        let envelope = decode_envelope::<RefreshData>(response.status, &response.body)?;
        Ok(Credential {
            access_token: envelope.data.token,
            refresh_token: envelope.data.refresh_token.or(Some(refresh_token)),
        })
    }

    fn sign_out(&self) {
        if self.end_session() {
            self.notify_sign_out();
        }
    }

    /// Clears the store. True on the transition into `SignedOut`.
    fn end_session(&self) -> bool {
        let was_signed_out = {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *phase, RefreshPhase::SignedOut) == RefreshPhase::SignedOut
        };
        self.store.clear();
        !was_signed_out
    }

    fn notify_sign_out(&self) {
        market_info!("Session ended, sign-in required");
        if let Some(hook) = &self.on_sign_out {
            hook();
        }
    }

    fn set_phase(&self, next: RefreshPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Attaches the bearer credential and replays once after a successful renewal.
pub struct AuthMiddleware {
    store: CredentialStore,
    flow: RefreshFlow,
}

impl AuthMiddleware {
    pub fn new(store: CredentialStore, flow: RefreshFlow) -> Self {
        Self { store, flow }
    }
}

#[async_trait::async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<RawResponse, ApiError> {
        let credential = self.store.get();
        if let Some(credential) = &credential {
            request.set_bearer(&credential.access_token);
        }

        let response = next.run(request.clone()).await?;
        if response.status != 401 || request.retried || request.skip_renewal {
            return Ok(response);
        }
        // Anonymous calls have nothing to renew.
        let Some(used) = credential else {
            return Ok(response);
        };

        let renewed = self.flow.renew(&used.access_token).await?;
        request.retried = true;
        request.set_bearer(&renewed.access_token);
        market_debug!("Replaying {} with renewed credential", request);
        next.run(request).await
    }
}
