use leadimport_core::error::CoreError;
use leadimport_core::lead_store::StoreError;
use leadimport_core::parser::ParseError;
use leadimport_core::types::DbId;

/// Errors that abort an import operation.
///
/// Row-level problems never surface here; they are recorded on the row.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Import job not found: {0}")]
    JobNotFound(DbId),

    #[error("Import job {id} cannot be committed in status '{status}'")]
    JobNotReady { id: DbId, status: String },

    #[error("Import job {0} is already being committed")]
    JobBusy(DbId),

    #[error("Import job {0} was cancelled")]
    Cancelled(DbId),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
