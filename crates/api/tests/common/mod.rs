//! Shared helpers for API integration tests. The app runs against the
//! in-memory lead store so no database is needed.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use leadimport_api::config::{ImportSettings, ServerConfig};
use leadimport_api::router::build_app_router;
use leadimport_api::state::AppState;
use leadimport_core::field::{FieldKey, NormalizedData};
use leadimport_core::importer::{CommitRequest, CommitRow};
use leadimport_core::parser::FileType;
use leadimport_core::types::RowNumber;
use leadimport_core::validation::evaluator::validate_mapped;
use leadimport_core::validation::rules::RowValidationResult;
use leadimport_pipeline::memory_store::MemoryLeadStore;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        import: ImportSettings {
            commit_wait_secs: 10,
            ..ImportSettings::default()
        },
    }
}

/// Build the full application router over `store`, returning the state too
/// so tests can reach the import registry.
pub fn build_test_app(store: Arc<MemoryLeadStore>) -> (Router, AppState) {
    let config = test_config();
    let state = AppState::new(store, config.clone());
    (build_app_router(state.clone(), &config), state)
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_bytes(app: &Router, uri: &str, body: &[u8]) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "text/csv")
        .body(Body::from(body.to_vec()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_empty(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn fields(pairs: &[(FieldKey, &str)]) -> NormalizedData {
    pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
}

pub fn validated_row(n: RowNumber, pairs: &[(FieldKey, &str)]) -> RowValidationResult {
    let mapped: BTreeMap<FieldKey, String> = pairs.iter().map(|(f, v)| (*f, v.to_string())).collect();
    validate_mapped(n, &mapped)
}

pub fn commit_row(n: RowNumber, pairs: &[(FieldKey, &str)]) -> CommitRow {
    CommitRow {
        validation: validated_row(n, pairs),
        raw_data: pairs
            .iter()
            .map(|(f, v)| (f.label().to_string(), v.to_string()))
            .collect(),
    }
}

pub fn commit_request(rows: Vec<CommitRow>) -> CommitRequest {
    CommitRequest {
        file_name: "leads.csv".into(),
        file_type: FileType::Csv,
        total_rows: rows.len(),
        validated_rows: rows,
        mappings: Vec::new(),
        assignment_config: Default::default(),
        duplicate_config: Default::default(),
        row_actions: Vec::new(),
        db_duplicate_info: Vec::new(),
        edited_rows: BTreeMap::new(),
        default_status: None,
        default_source: None,
    }
}

/// Valid first row, a row with no contact field and a file duplicate of
/// the first row, with the user's skip decisions.
pub fn scenario_request() -> Value {
    let mut request = commit_request(vec![
        commit_row(1, &[(FieldKey::Email, "jean@test.com"), (FieldKey::FirstName, "Jean")]),
        commit_row(2, &[(FieldKey::FirstName, "Marie"), (FieldKey::Company, "Acme")]),
        commit_row(3, &[(FieldKey::Email, "Jean@Test.COM")]),
    ]);
    request.row_actions = vec![(2, "skip".into()), (3, "skip".into())];
    serde_json::to_value(request).unwrap()
}
