use std::time::{Duration, Instant};

use marketplace_engine::{
    ApiClient, ClientSettings, Credential, CredentialStore, EngineEvent, EngineHandle, ErrorKind,
    PageInfo, SearchCommand, SearchEndpoint,
};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Hit {
    id: String,
    title: String,
}

fn hits(prefix: &str, count: usize) -> serde_json::Value {
    let items: Vec<_> = (0..count)
        .map(|i| json!({"id": format!("{prefix}-{i}"), "title": format!("Plumber {i}")}))
        .collect();
    json!(items)
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn next_event<T>(engine: &EngineHandle<T>, within: Duration) -> Option<EngineEvent<T>>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    let deadline = Instant::now() + within;
    loop {
        if let Some(event) = engine.try_recv() {
            return Some(event);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn search_appends_paging_and_decodes_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/artisans"))
        .and(query_param("keyword", "plumber"))
        .and(query_param("skills", "pipes,welding"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": hits("a", 20),
            "pagination": {"page": 2, "limit": 20, "total": 45, "pages": 3},
            "suggestions": ["plumbing", "plumber near me"],
            "facets": {"category": {"plumbing": 45}},
            "searchTime": 12.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder(
        ClientSettings::with_base_url(server.uri()),
        CredentialStore::in_memory(),
    )
    .build()
    .expect("client builds");

    let page = client
        .search::<Hit>(
            SearchEndpoint::Artisans,
            &params(&[("keyword", "plumber"), ("skills", "pipes,welding")]),
            2,
            20,
        )
        .await
        .expect("page");

    assert_eq!(page.data.len(), 20);
    assert_eq!(page.data[0].id, "a-0");
    assert_eq!(
        page.pagination,
        PageInfo {
            page: 2,
            limit: 20,
            total: 45,
            pages: 3
        }
    );
    assert_eq!(page.suggestions, vec!["plumbing", "plumber near me"]);
    assert!(page.facets.is_some());
    assert_eq!(page.search_time_ms, Some(12.5));
}

#[tokio::test]
async fn unsuccessful_search_envelope_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Search index unavailable"
        })))
        .mount(&server)
        .await;

    let client = ApiClient::builder(
        ClientSettings::with_base_url(server.uri()),
        CredentialStore::in_memory(),
    )
    .build()
    .expect("client builds");

    let err = client
        .search::<Hit>(SearchEndpoint::Jobs, &[], 1, 20)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.message, "Search index unavailable");
}

#[tokio::test]
async fn missing_pagination_is_a_single_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": hits("j", 3)})))
        .mount(&server)
        .await;

    let client = ApiClient::builder(
        ClientSettings::with_base_url(server.uri()),
        CredentialStore::in_memory(),
    )
    .build()
    .expect("client builds");

    let page = client
        .search::<Hit>(SearchEndpoint::Jobs, &[], 1, 20)
        .await
        .expect("page");
    assert_eq!(
        page.pagination,
        PageInfo {
            page: 1,
            limit: 20,
            total: 3,
            pages: 1
        }
    );
    assert!(page.suggestions.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_reports_completed_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .and(query_param("keyword", "plumber"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": hits("j", 2),
            "pagination": {"page": 1, "limit": 20, "total": 2, "pages": 1}
        })))
        .mount(&server)
        .await;

    let engine = EngineHandle::<Hit>::new(
        ClientSettings::with_base_url(server.uri()),
        CredentialStore::in_memory(),
    )
    .expect("engine starts");
    engine.search(SearchCommand {
        generation: 1,
        endpoint: SearchEndpoint::Jobs,
        params: params(&[("keyword", "plumber")]),
        page: 1,
        limit: 20,
    });

    match next_event(&engine, Duration::from_secs(5)).await {
        Some(EngineEvent::SearchCompleted {
            generation,
            page,
            result: Ok(found),
        }) => {
            assert_eq!((generation, page), (1, 1));
            assert_eq!(found.data.len(), 2);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_generation_aborts_older_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .and(query_param("keyword", "plu"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(400))
                .set_body_json(json!({"data": hits("stale", 1)})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .and(query_param("keyword", "plumber"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": hits("fresh", 1)})))
        .mount(&server)
        .await;

    let engine = EngineHandle::<Hit>::new(
        ClientSettings::with_base_url(server.uri()),
        CredentialStore::in_memory(),
    )
    .expect("engine starts");
    for (generation, keyword) in [(1, "plu"), (2, "plumber")] {
        engine.search(SearchCommand {
            generation,
            endpoint: SearchEndpoint::Jobs,
            params: params(&[("keyword", keyword)]),
            page: 1,
            limit: 20,
        });
    }

    let mut generations = Vec::new();
    while let Some(event) = next_event(&engine, Duration::from_millis(900)).await {
        if let EngineEvent::SearchCompleted { generation, .. } = event {
            generations.push(generation);
        }
    }
    assert_eq!(generations, vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_reports_session_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/jobs"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = CredentialStore::in_memory();
    store.set(Some(Credential::new("old", Some("refresh-1".to_string()))));
    let engine =
        EngineHandle::<Hit>::new(ClientSettings::with_base_url(server.uri()), store.clone())
            .expect("engine starts");
    engine.search(SearchCommand {
        generation: 1,
        endpoint: SearchEndpoint::Jobs,
        params: Vec::new(),
        page: 1,
        limit: 20,
    });

    let mut expired = false;
    let mut failure = None;
    while let Some(event) = next_event(&engine, Duration::from_secs(2)).await {
        match event {
            EngineEvent::SessionExpired => expired = true,
            EngineEvent::SearchCompleted { result, .. } => {
                failure = result.err();
                break;
            }
            EngineEvent::SignInCompleted(_) => {}
        }
    }

    assert!(expired);
    assert_eq!(failure.map(|err| err.kind), Some(ErrorKind::Unauthorized));
    assert_eq!(store.get(), None);
}
