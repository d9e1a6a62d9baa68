use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use leadimport_core::error::CoreError;
use leadimport_core::lead_store::StoreError;
use leadimport_pipeline::ImportError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain, store and pipeline errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce `{ "error", "code" }`
/// JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Import(#[from] ImportError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Store(store) => classify_store_error(store),
            AppError::Import(import) => classify_import_error(import),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(msg: &dyn std::fmt::Display) -> Classified {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => internal(msg),
    }
}

/// Constraint violations map to 409, an unreachable store to 503 and
/// everything else to a sanitized 500.
fn classify_store_error(err: &StoreError) -> Classified {
    match err {
        StoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        StoreError::Constraint(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        StoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "Store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "The database is unavailable".to_string(),
            )
        }
        StoreError::Database(msg) => internal(msg),
    }
}

fn classify_import_error(err: &ImportError) -> Classified {
    match err {
        ImportError::JobNotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Import job with id {id} not found"),
        ),
        ImportError::JobNotReady { .. } | ImportError::JobBusy(_) | ImportError::Cancelled(_) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        ImportError::Parse(e) => (StatusCode::BAD_REQUEST, "PARSE_ERROR", e.to_string()),
        ImportError::Core(core) => classify_core_error(core),
        ImportError::Store(store) => classify_store_error(store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn import_errors_map_to_http_statuses() {
        assert_eq!(status_of(ImportError::JobNotFound(4).into()), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ImportError::JobBusy(4).into()), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ImportError::Core(CoreError::Validation("no rows".into())).into()),
            StatusCode::BAD_REQUEST,
        );
        assert_eq!(
            status_of(ImportError::Store(StoreError::Unavailable("down".into())).into()),
            StatusCode::SERVICE_UNAVAILABLE,
        );
    }

    #[test]
    fn database_errors_are_sanitized() {
        let response = AppError::Store(StoreError::Database("relation leads does not exist".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
