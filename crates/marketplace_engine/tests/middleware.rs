use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marketplace_engine::{
    ApiClient, ApiError, ApiRequest, ClientSettings, Credential, CredentialStore, ErrorKind,
    Middleware, Next, RawResponse, RequestBody, Transport, REFRESH_PATH,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

type Responder = Box<dyn Fn(&ApiRequest) -> Result<RawResponse, ApiError> + Send + Sync>;

/// Records every request and answers from a closure. No sockets involved.
struct ScriptedTransport {
    seen: Mutex<Vec<ApiRequest>>,
    respond: Responder,
}

impl ScriptedTransport {
    fn new(
        respond: impl Fn(&ApiRequest) -> Result<RawResponse, ApiError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn seen(&self) -> Vec<ApiRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        self.seen.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}

/// Appends its name to a shared journal on the way in.
struct Journal {
    name: &'static str,
    entries: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Middleware for Journal {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<RawResponse, ApiError> {
        self.entries
            .lock()
            .unwrap()
            .push(format!("{} {}", self.name, request));
        next.run(request).await
    }
}

struct TagRequests;

#[async_trait]
impl Middleware for TagRequests {
    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> Result<RawResponse, ApiError> {
        request.set_header("X-Request-Source", "tests");
        next.run(request).await
    }
}

fn ok_json(body: Value) -> Result<RawResponse, ApiError> {
    Ok(RawResponse::new(200, serde_json::to_vec(&body).unwrap()))
}

#[tokio::test]
async fn custom_middleware_runs_in_registration_order() {
    let entries: Arc<Mutex<Vec<String>>> = Arc::default();
    let transport = ScriptedTransport::new(|_| ok_json(json!({"data": 1})));
    let client = ApiClient::builder(ClientSettings::default(), CredentialStore::in_memory())
        .transport(transport.clone())
        .middleware(Arc::new(Journal {
            name: "first",
            entries: entries.clone(),
        }))
        .middleware(Arc::new(Journal {
            name: "second",
            entries: entries.clone(),
        }))
        .middleware(Arc::new(TagRequests))
        .build()
        .expect("client builds");

    let envelope = client.get::<u32>("/stats", &[]).await.expect("ok");

    assert_eq!(envelope.data, 1);
    assert_eq!(
        *entries.lock().unwrap(),
        vec!["first GET /stats".to_string(), "second GET /stats".to_string()]
    );
    let seen = transport.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].header("x-request-source"), Some("tests"));
}

#[tokio::test]
async fn auth_runs_innermost_and_replays_below_custom_middleware() {
    let entries: Arc<Mutex<Vec<String>>> = Arc::default();
    let transport = ScriptedTransport::new(|request| {
        if request.path == REFRESH_PATH {
            return ok_json(json!({"data": {"token": "new"}}));
        }
        match request.bearer() {
            Some("new") => ok_json(json!({"data": "mine"})),
            _ => Ok(RawResponse::new(401, "")),
        }
    });
    let store = CredentialStore::in_memory();
    store.set(Some(Credential::new("old", Some("refresh-1".to_string()))));
    let client = ApiClient::builder(ClientSettings::default(), store)
        .transport(transport.clone())
        .middleware(Arc::new(Journal {
            name: "outer",
            entries: entries.clone(),
        }))
        .build()
        .expect("client builds");

    let envelope = client.get::<String>("/jobs/mine", &[]).await.expect("ok");
    assert_eq!(envelope.data, "mine");

    // The replay and the refresh call never pass back through outer middleware.
    assert_eq!(entries.lock().unwrap().len(), 1);

    let seen = transport.seen();
    let summary: Vec<(String, Option<&str>, bool)> = seen
        .iter()
        .map(|request| (request.to_string(), request.bearer(), request.retried))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("GET /jobs/mine".to_string(), Some("old"), false),
            ("POST /auth/refresh".to_string(), None, false),
            ("GET /jobs/mine".to_string(), Some("new"), true),
        ]
    );
    assert_eq!(seen[1].body, RequestBody::Json(json!({"refreshToken": "refresh-1"})));
    assert!(seen[1].skip_renewal);
}

#[tokio::test]
async fn transport_failure_passes_through_the_chain() {
    let transport = ScriptedTransport::new(|_| Err(ApiError::network()));
    let client = ApiClient::builder(ClientSettings::default(), CredentialStore::in_memory())
        .transport(transport)
        .build()
        .expect("client builds");

    let err = client.get::<Value>("/anything", &[]).await.unwrap_err();
    assert_eq!(err, ApiError::network());
    assert_eq!(err.kind, ErrorKind::Network);
}

#[tokio::test]
async fn short_circuiting_middleware_skips_transport() {
    struct Offline;

    #[async_trait]
    impl Middleware for Offline {
        async fn handle(&self, _request: ApiRequest, _next: Next<'_>) -> Result<RawResponse, ApiError> {
            Ok(RawResponse::new(503, r#"{"message":"Offline mode"}"#))
        }
    }

    let transport = ScriptedTransport::new(|_| ok_json(json!({})));
    let client = ApiClient::builder(ClientSettings::default(), CredentialStore::in_memory())
        .transport(transport.clone())
        .middleware(Arc::new(Offline))
        .build()
        .expect("client builds");

    let err = client.get::<Value>("/jobs", &[]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.message, "Offline mode");
    assert!(transport.seen().is_empty());
}
