//! Import job and import row status values.
//!
//! Stored as text in `import_jobs.status` and `import_rows.status`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ready,
    Queued,
    Importing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Statuses from which a commit may start or resume. A cancelled job
    /// keeps its unprocessed rows `valid`, so it can be resumed.
    pub const COMMITTABLE: [JobStatus; 4] = [Self::Ready, Self::Queued, Self::Importing, Self::Cancelled];

    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "ready" => Ok(Self::Ready),
            "queued" => Ok(Self::Queued),
            "importing" => Ok(Self::Importing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(CoreError::Validation(format!(
                "Invalid import job status '{s}'. Must be one of: ready, queued, importing, completed, failed, cancelled"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Queued => "queued",
            Self::Importing => "importing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_committable(&self) -> bool {
        Self::COMMITTABLE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Row status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Waiting for the commit worker.
    Valid,
    Skipped,
    Imported,
    Updated,
    Error,
}

impl RowStatus {
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "valid" => Ok(Self::Valid),
            "skipped" => Ok(Self::Skipped),
            "imported" => Ok(Self::Imported),
            "updated" => Ok(Self::Updated),
            "error" => Ok(Self::Error),
            _ => Err(CoreError::Validation(format!(
                "Invalid import row status '{s}'. Must be one of: valid, skipped, imported, updated, error"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Skipped => "skipped",
            Self::Imported => "imported",
            Self::Updated => "updated",
            Self::Error => "error",
        }
    }

    /// Whether the commit worker is done with this row.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Valid)
    }

    /// Label used in the downloadable report.
    pub fn report_label(&self) -> &'static str {
        match self {
            Self::Valid => "Pending",
            Self::Skipped => "Skipped",
            Self::Imported => "Imported",
            Self::Updated => "Updated",
            Self::Error => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_roundtrip() {
        for s in ["ready", "queued", "importing", "completed", "failed", "cancelled"] {
            assert_eq!(JobStatus::from_str_db(s).unwrap().as_str(), s);
        }
        assert!(JobStatus::from_str_db("paused").is_err());
    }

    #[test]
    fn committable_statuses() {
        assert!(JobStatus::Ready.is_committable());
        assert!(JobStatus::Queued.is_committable());
        assert!(JobStatus::Importing.is_committable());
        assert!(JobStatus::Cancelled.is_committable());
        assert!(!JobStatus::Completed.is_committable());
        assert!(!JobStatus::Failed.is_committable());
    }

    #[test]
    fn row_status_roundtrip() {
        for s in ["valid", "skipped", "imported", "updated", "error"] {
            assert_eq!(RowStatus::from_str_db(s).unwrap().as_str(), s);
        }
        assert!(RowStatus::from_str_db("pending").is_err());
        assert!(!RowStatus::Valid.is_settled());
        assert!(RowStatus::Imported.is_settled());
    }
}
