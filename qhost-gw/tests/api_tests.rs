//! Integration tests for the qhost-gw HTTP surface
//!
//! Tests cover:
//! - Method guard on /graphql
//! - Legacy requests answered from the data backend
//! - Native fallback for failed legacy attempts
//! - Continuation fragments after a legacy map
//! - Health and index routes

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

use qhost_gw::backend::{BackendError, DataBackend, LocalDataBackend, SeriesRequest};
use qhost_gw::dispatch::bridge::ExecutionBridge;
use qhost_gw::dispatch::translate::RoutingTags;
use qhost_gw::dispatch::OutboundRequest;
use qhost_gw::native::{self, StaticSchema};
use qhost_gw::{build_router, AppState};

const PAYLOAD: &[u8] = br#"{"Meta Data":{"2. Symbol":"ABC"}}"#;

/// Test double recording every backend call
#[derive(Default)]
struct RecordingBackend {
    valid_key: Option<String>,
    validations: Mutex<Vec<String>>,
    fetches: Mutex<Vec<SeriesRequest>>,
}

impl RecordingBackend {
    fn accepting(key: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_key: Some(key.to_string()),
            ..Default::default()
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.validations.lock().unwrap().len() + self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl DataBackend for RecordingBackend {
    async fn validate_credential(
        &self,
        key: &str,
        _source: &str,
        _interface: &str,
    ) -> Result<bool, BackendError> {
        self.validations.lock().unwrap().push(key.to_string());
        Ok(self.valid_key.as_deref() == Some(key))
    }

    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Bytes, BackendError> {
        self.fetches.lock().unwrap().push(request.clone());
        Ok(Bytes::from_static(PAYLOAD))
    }
}

/// Test helper: Create app around a backend double
fn setup_app(backend: Arc<RecordingBackend>) -> axum::Router {
    let state = AppState::new(
        backend,
        Arc::new(StaticSchema::greeting()),
        RoutingTags::default(),
    );
    build_router(state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
}

async fn extract_json(body: Body) -> Value {
    serde_json::from_slice(&read_body(body).await).expect("Should parse JSON")
}

fn legacy_body(key: &str, tail: &str) -> String {
    let blob = format!(
        "{{'apikey':'{}','function':'TIME_SERIES_DAILY','symbol':'ABC','start':'1','end':'2'}}{}",
        key, tail
    );
    json!({ "query": blob }).to_string()
}

// =============================================================================
// Method guard
// =============================================================================

#[tokio::test]
async fn test_disallowed_methods_get_405_envelope() {
    for method in [Method::PUT, Method::DELETE, Method::PATCH] {
        let backend = RecordingBackend::accepting("k1");
        let app = setup_app(backend.clone());

        let request = Request::builder()
            .method(method.clone())
            .uri("/graphql")
            .body(Body::from(legacy_body("k1", "")))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
        let body = extract_json(response.into_body()).await;
        assert_eq!(
            body,
            json!({"errors": [{"message": format!("{} not allowed", method)}]})
        );
        assert_eq!(backend.calls(), 0);
    }
}

// =============================================================================
// Legacy success
// =============================================================================

#[tokio::test]
async fn test_legacy_body_returns_backend_bytes() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend.clone());

    let response = app
        .oneshot(post_json("/graphql", &legacy_body("k1", "")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(&read_body(response.into_body()).await[..], PAYLOAD);

    let fetches = backend.fetches.lock().unwrap();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].symbol, "ABC");
    assert_eq!(fetches[0].period_secs, 86_400);
    assert_eq!(fetches[0].start, "1");
    assert_eq!(fetches[0].end, "2");
    assert_eq!(fetches[0].source, "av");
    assert_eq!(fetches[0].interface, "av");
}

#[tokio::test]
async fn test_legacy_body_with_escaped_double_quotes() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend.clone());

    let body = r#"{"query": "{\"apikey\":\"k1\",\"function\":\"60\",\"symbol\":\"ABC\",\"start\":\"1\",\"end\":\"2\"}"}"#;
    let response = app.oneshot(post_json("/graphql", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend.fetches.lock().unwrap()[0].period_secs, 60);
}

#[tokio::test]
async fn test_legacy_url_params_return_backend_bytes() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend.clone());

    let response = app
        .oneshot(get(
            "/graphql?function=TIME_SERIES_DAILY&symbol=ABC&apikey=k1&start=2020-01-01&end=2020-02-01",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&read_body(response.into_body()).await[..], PAYLOAD);
    assert_eq!(backend.fetches.lock().unwrap()[0].start, "2020-01-01");
}

// =============================================================================
// Native fallback
// =============================================================================

#[tokio::test]
async fn test_bad_credential_falls_back_to_native() {
    let backend = RecordingBackend::rejecting();
    let app = setup_app(backend.clone());
    let body = legacy_body("nope", "");

    let response = app.oneshot(post_json("/graphql", &body)).await.unwrap();
    let status = response.status();
    let bytes = read_body(response.into_body()).await;

    // Exactly what native handling of the unchanged request produces
    let bridge = ExecutionBridge::new(
        RecordingBackend::rejecting(),
        Arc::new(StaticSchema::greeting()),
        RoutingTags::default(),
    );
    let expected = native::dispatch(
        &bridge,
        &OutboundRequest {
            method: Method::POST,
            body: body.clone(),
            params: vec![],
        },
    )
    .await;

    assert_eq!(status, expected.status);
    assert_eq!(bytes, expected.body);
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let errors: Value = serde_json::from_slice(&bytes).unwrap();
    let message = errors["errors"][0]["message"].as_str().unwrap();
    assert!(message.starts_with("Syntax Error"), "got {}", message);
    assert!(!message.to_lowercase().contains("credential"));

    assert_eq!(backend.validations.lock().unwrap().len(), 1);
    assert!(backend.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_continuation_fragment_in_body_runs_natively() {
    let backend = RecordingBackend::rejecting();
    let app = setup_app(backend);

    let response = app
        .oneshot(post_json("/graphql", &legacy_body("nope", "#@{ hello }")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!({"data": {"hello": "Hello, world."}}));
}

#[tokio::test]
async fn test_continuation_fragment_after_variables_runs_natively() {
    let backend = RecordingBackend::rejecting();
    let app = setup_app(backend);

    let body = r#"{"variables":{"a":"b"},"query":"{'apikey':'x'}#@{ hello }"}"#;
    let response = app.oneshot(post_json("/graphql", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!({"data": {"hello": "Hello, world."}}));
}

#[tokio::test]
async fn test_continuation_fragment_in_query_param_runs_natively() {
    let backend = RecordingBackend::rejecting();
    let app = setup_app(backend);

    // query={'apikey':'x'}#@{ version }
    let response = app
        .oneshot(get(
            "/graphql?query=%7B%27apikey%27%3A%27x%27%7D%23%40%7B%20version%20%7D",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_plain_url_params_end_in_missing_query_error() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend.clone());

    let response = app.oneshot(get("/graphql?a=1&b=2")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!({"errors": [{"message": "Must provide query string."}]}));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_native_get_query_is_served() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend.clone());

    let response = app.oneshot(get("/graphql?query=%7B%20hello%20%7D")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"]["hello"], "Hello, world.");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_native_post_with_unknown_field() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend);

    let response = app
        .oneshot(post_json("/graphql", r#"{"query": "{ quotes }"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body["errors"][0]["message"],
        "Cannot query field \"quotes\" on type \"Query\"."
    );
}

#[tokio::test]
async fn test_invalid_json_body_gets_native_error() {
    let backend = RecordingBackend::accepting("k1");
    let app = setup_app(backend);

    let response = app.oneshot(post_json("/graphql", "{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["errors"][0]["message"], "POST body sent invalid JSON.");
}

// =============================================================================
// File backend end to end
// =============================================================================

#[tokio::test]
async fn test_local_backend_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("av");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(
        source.join("apikeys"),
        qhost_gw::backend::local::key_digest("secret"),
    )
    .unwrap();
    std::fs::write(source.join("ABC.csv"), "86400,1,2,0.5,1.5,10\n").unwrap();

    let backend = LocalDataBackend::new(dir.path(), Duration::from_secs(5));
    let state = AppState::new(
        Arc::new(backend),
        Arc::new(StaticSchema::greeting()),
        RoutingTags::default(),
    );
    let app = build_router(state);

    let response = app
        .oneshot(get(
            "/graphql?apikey=secret&function=TIME_SERIES_DAILY&symbol=ABC&start=0&end=100000",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["Meta Data"]["2. Symbol"], "ABC");
    assert_eq!(body["Time Series (Daily)"]["1970-01-02"]["4. close"], "1.5000");
}

// =============================================================================
// Plumbing routes
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app(RecordingBackend::rejecting());

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "qhost-gw");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_index_greeting() {
    let app = setup_app(RecordingBackend::rejecting());

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response.into_body()).await;
    assert_eq!(&body[..], b"Hello, world. You're at the qhost index.");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let state = AppState::new(
        RecordingBackend::rejecting(),
        Arc::new(StaticSchema::greeting()),
        RoutingTags::default(),
    )
    .with_max_body_bytes(1024);
    let app = build_router(state);

    let body = format!("{{\"query\": \"{}\"}}", "x".repeat(4096));
    let response = app.oneshot(post_json("/graphql", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
