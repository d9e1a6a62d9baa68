//! Import progress snapshot shared by the commit worker, the wizard and the
//! progress endpoint.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Preparing,
    Importing,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Importing => "importing",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Live per-outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub imported: i64,
    pub updated: i64,
    pub skipped: i64,
    pub errors: i64,
}

impl ProgressCounters {
    pub fn total(&self) -> i64 {
        self.imported + self.updated + self.skipped + self.errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub job_id: DbId,
    pub phase: ImportPhase,
    pub processed_rows: i64,
    pub total_rows: i64,
    pub current_batch: u32,
    pub total_batches: u32,
    pub counters: ProgressCounters,
}

impl ImportProgress {
    pub fn new(job_id: DbId, total_rows: i64, total_batches: u32) -> Self {
        Self {
            job_id,
            phase: ImportPhase::Preparing,
            processed_rows: 0,
            total_rows,
            current_batch: 0,
            total_batches,
            counters: ProgressCounters::default(),
        }
    }

    /// Completion percentage in `[0, 100]`.
    pub fn percent(&self) -> u8 {
        if self.total_rows <= 0 {
            return if self.phase.is_finished() { 100 } else { 0 };
        }
        let pct = (self.processed_rows.min(self.total_rows) * 100) / self.total_rows;
        pct as u8
    }
}
