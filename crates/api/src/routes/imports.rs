//! Route definitions for the `/imports` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::ImportSettings;
use crate::handlers::imports;
use crate::state::AppState;

/// Room for the JSON envelope around a full file's worth of rows.
const JSON_BODY_OVERHEAD: usize = 4;

/// Routes mounted at `/imports`.
///
/// ```text
/// GET    /                -> list_imports
/// POST   /parse           -> parse_file
/// POST   /preview         -> preview_rows
/// POST   /duplicates      -> check_duplicates
/// POST   /commit          -> commit_import
/// GET    /{id}            -> get_import
/// POST   /{id}/commit     -> resume_import
/// GET    /{id}/progress   -> get_progress
/// GET    /{id}/rows       -> list_rows
/// POST   /{id}/cancel     -> cancel_import
/// GET    /{id}/report     -> download_report
/// ```
///
/// Upload-sized bodies are accepted on `/parse` (the raw file) and on the
/// routes that carry every row as JSON.
pub fn router(settings: &ImportSettings) -> Router<AppState> {
    let file_limit = DefaultBodyLimit::max(settings.max_file_bytes);
    let rows_limit = DefaultBodyLimit::max(settings.max_file_bytes.saturating_mul(JSON_BODY_OVERHEAD));

    Router::new()
        .route("/", get(imports::list_imports))
        .route("/parse", post(imports::parse_file).layer(file_limit))
        .route("/preview", post(imports::preview_rows).layer(rows_limit.clone()))
        .route("/duplicates", post(imports::check_duplicates).layer(rows_limit.clone()))
        .route("/commit", post(imports::commit_import).layer(rows_limit))
        .route("/{id}", get(imports::get_import))
        .route("/{id}/commit", post(imports::resume_import))
        .route("/{id}/progress", get(imports::get_progress))
        .route("/{id}/rows", get(imports::list_rows))
        .route("/{id}/cancel", post(imports::cancel_import))
        .route("/{id}/report", get(imports::download_report))
}
