use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use marketplace_engine::{
    ApiClient, ClientSettings, Credential, CredentialStore, ErrorKind, RefreshPhase,
    SESSION_EXPIRED_MESSAGE,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

struct Harness {
    client: ApiClient,
    store: CredentialStore,
    sign_outs: Arc<AtomicUsize>,
}

fn harness(server: &MockServer, credential: Option<Credential>) -> Harness {
    let store = CredentialStore::in_memory();
    store.set(credential);
    let sign_outs = Arc::new(AtomicUsize::new(0));
    let counter = sign_outs.clone();
    let client = ApiClient::builder(ClientSettings::with_base_url(server.uri()), store.clone())
        .on_sign_out(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .expect("client builds");
    Harness {
        client,
        store,
        sign_outs,
    }
}

fn signed_in(access: &str, refresh: &str) -> Option<Credential> {
    Some(Credential::new(access, Some(refresh.to_string())))
}

async fn mount_protected(
    server: &MockServer,
    token: &str,
    status: u16,
    expected: impl Into<Times>,
) {
    Mock::given(method("GET"))
        .and(path("/jobs/mine"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "status": if status == 200 { "success" } else { "error" },
            "data": [{"id": "job-1"}],
            "message": if status == 200 { "ok" } else { "Token expired" }
        })))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn rejected_request_is_replayed_with_renewed_credential() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    mount_protected(&server, "new", 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"token": "new"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let envelope = h.client.get::<Value>("/jobs/mine", &[]).await.expect("replayed");

    assert_eq!(envelope.data[0]["id"], "job-1");
    assert_eq!(h.store.get(), signed_in("new", "refresh-1"));
    assert_eq!(h.client.refresh_flow().phase(), RefreshPhase::Idle);
    assert_eq!(h.sign_outs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rotated_refresh_token_replaces_the_old_one() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    mount_protected(&server, "new", 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"token": "new", "refreshToken": "refresh-2"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    h.client.get::<Value>("/jobs/mine", &[]).await.expect("replayed");

    assert_eq!(h.store.get(), signed_in("new", "refresh-2"));
}

#[tokio::test]
async fn concurrent_rejections_share_one_renewal() {
    let server = MockServer::start().await;
    // Late arrivals may already carry the renewed token.
    mount_protected(&server, "old", 401, 1..=5).await;
    mount_protected(&server, "new", 200, 5).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({"data": {"token": "new"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let calls = (0..5).map(|_| h.client.get::<Value>("/jobs/mine", &[]));
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok), "{results:?}");
    assert_eq!(h.store.get(), signed_in("new", "refresh-1"));
}

#[tokio::test]
async fn rejected_renewal_signs_out_once() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 3).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_delay(Duration::from_millis(100))
                .set_body_json(json!({"message": "Refresh token revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let calls = (0..3).map(|_| h.client.get::<Value>("/jobs/mine", &[]));
    let results = join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(err.message, SESSION_EXPIRED_MESSAGE);
    }
    assert_eq!(h.store.get(), None);
    assert_eq!(h.sign_outs.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.refresh_flow().phase(), RefreshPhase::SignedOut);
}

#[tokio::test]
async fn requests_after_sign_out_are_anonymous() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let _ = h.client.get::<Value>("/jobs/mine", &[]).await.unwrap_err();
    h.client
        .get::<Value>("/search/jobs", &[])
        .await
        .expect("anonymous search");

    let requests = server.received_requests().await.expect("recording enabled");
    let last = requests.last().expect("search request");
    assert_eq!(last.url.path(), "/search/jobs");
    assert!(last.headers.get("authorization").is_none());
}

#[tokio::test]
async fn missing_refresh_token_signs_out_without_exchange() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, Some(Credential::new("old", None)));
    let err = h.client.get::<Value>("/jobs/mine", &[]).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(h.store.get(), None);
    assert_eq!(h.sign_outs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replay_happens_at_most_once() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    mount_protected(&server, "new", 401, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"token": "new"}})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let err = h.client.get::<Value>("/jobs/mine", &[]).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(err.message, "Token expired");
    // The second rejection is surfaced, not renewed again.
    assert_eq!(h.store.get(), signed_in("new", "refresh-1"));
    assert_eq!(h.sign_outs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abandoned_caller_does_not_stall_renewal() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"data": {"token": "new"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        h.client.get::<Value>("/jobs/mine", &[]),
    )
    .await;
    assert!(abandoned.is_err(), "caller should time out mid-renewal");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.client.refresh_flow().phase(), RefreshPhase::Idle);
    assert_eq!(h.store.get(), signed_in("new", "refresh-1"));
    assert_eq!(h.sign_outs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn renewed_credential_rejected_later_starts_a_fresh_exchange() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    mount_protected(&server, "new", 401, 2).await;
    mount_protected(&server, "newest", 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"token": "new", "refreshToken": "refresh-2"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"token": "newest"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let first = h.client.get::<Value>("/jobs/mine", &[]).await.unwrap_err();
    assert_eq!(first.kind, ErrorKind::Unauthorized);
    assert_eq!(h.store.get(), signed_in("new", "refresh-2"));

    h.client
        .get::<Value>("/jobs/mine", &[])
        .await
        .expect("renewed again and replayed");
    assert_eq!(h.store.get(), signed_in("newest", "refresh-2"));
    assert_eq!(h.client.refresh_flow().phase(), RefreshPhase::Idle);
}

#[tokio::test]
async fn anonymous_rejection_is_not_renewed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/mine"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Authentication required"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let err = h.client.get::<Value>("/jobs/mine", &[]).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(err.message, "Authentication required");
    assert_eq!(h.sign_outs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sign_in_after_sign_out_rearms_renewal() {
    let server = MockServer::start().await;
    mount_protected(&server, "old", 401, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "ada@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"token": "fresh", "refreshToken": "refresh-9"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in("old", "refresh-1"));
    let _ = h.client.get::<Value>("/jobs/mine", &[]).await.unwrap_err();
    assert_eq!(h.client.refresh_flow().phase(), RefreshPhase::SignedOut);

    h.client
        .sign_in("ada@example.com", "hunter2")
        .await
        .expect("signed in");

    assert_eq!(h.store.get(), signed_in("fresh", "refresh-9"));
    assert_eq!(h.client.refresh_flow().phase(), RefreshPhase::Idle);
}
