pub mod health;
pub mod imports;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /imports                      list jobs
/// /imports/parse                parse an uploaded file, suggest mappings (POST)
/// /imports/preview              validate rows and detect duplicates (POST)
/// /imports/duplicates           database duplicate check (POST)
/// /imports/commit               submit and run an import (POST)
/// /imports/{id}                 job detail
/// /imports/{id}/progress        live or persisted progress
/// /imports/{id}/rows            staged rows, optional status filter
/// /imports/{id}/cancel          cancel a running or pending job (POST)
/// /imports/{id}/report          CSV report download
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new().nest("/imports", imports::router(&config.import))
}
