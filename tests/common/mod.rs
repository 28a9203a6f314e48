#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use analysis_worker::stub::StubFactory;
use analysis_worker::{Depth, Orchestrator, OrchestratorConfig};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value as JsonValue;
use tower::ServiceExt;

pub const OPEN_GAME: [&str; 4] = ["e4", "e5", "Nf3", "Nc6"];

pub const OPEN_GAME_PGN: &str = r#"[Event "Casual Game"]
[White "Alice"]
[Black "Bob"]
[Result "*"]

1. e4 e5 2. Nf3 Nc6 *
"#;

/// Orchestrator settings for tests: small pool, short job timeout.
pub fn test_config(max_workers: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        max_workers,
        job_timeout: Some(Duration::from_secs(5)),
        batch_deadline: None,
        abort_on_failure: false,
    }
}

/// Build an orchestrator over `factory`, keeping the factory's counters reachable.
pub fn orchestrator(factory: &StubFactory, max_workers: usize) -> Orchestrator<StubFactory> {
    Orchestrator::new(factory.clone(), test_config(max_workers))
}

/// Build the HTTP app over a stub evaluator.
pub fn app(factory: &StubFactory) -> Router {
    server::app(Arc::new(orchestrator(factory, 4)))
}

pub fn depth(value: i64) -> Depth {
    Depth::new(value).unwrap()
}

pub fn moves(list: &[&str]) -> Vec<String> {
    list.iter().map(|m| m.to_string()).collect()
}

/// Send one request through the router and decode the JSON reply.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, JsonValue) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: JsonValue) -> (StatusCode, JsonValue) {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> (StatusCode, JsonValue) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}
