//! The lead store seam.
//!
//! Everything the import pipeline reads or writes goes through
//! [`LeadStore`]. The PostgreSQL implementation lives in the db crate; an
//! in-memory implementation backs the pipeline and API tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::LeadHistoryEntry;
use crate::field::{FieldKey, NormalizedData};
use crate::import_status::{JobStatus, RowStatus};
use crate::importer::{AssignmentConfig, DuplicateConfig, ImportResultsSummary, RowAction};
use crate::lead::{AssignableUser, ExistingLeadSnapshot, LeadUpdate, NewLead};
use crate::mapping::ColumnMapping;
use crate::types::{DbId, LeadId, RowNumber, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Job and row records
// ---------------------------------------------------------------------------

/// Token identifying the worker that holds a job's lease.
pub type LeaseToken = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: DbId,
    pub status: JobStatus,
    pub file_name: String,
    pub file_type: String,
    pub total_rows: i64,
    pub valid_rows: i64,
    pub processed_rows: i64,
    pub imported_count: i64,
    pub updated_count: i64,
    pub skipped_count: i64,
    pub error_count: i64,
    pub mappings: Vec<ColumnMapping>,
    pub assignment_config: AssignmentConfig,
    pub duplicate_config: DuplicateConfig,
    pub default_status: String,
    pub default_source: String,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl ImportJob {
    pub fn summary(&self) -> ImportResultsSummary {
        ImportResultsSummary {
            total_rows: self.total_rows,
            imported_count: self.imported_count,
            updated_count: self.updated_count,
            skipped_count: self.skipped_count,
            error_count: self.error_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewImportJob {
    pub file_name: String,
    pub file_type: String,
    pub total_rows: i64,
    pub valid_rows: i64,
    pub mappings: Vec<ColumnMapping>,
    pub assignment_config: AssignmentConfig,
    pub duplicate_config: DuplicateConfig,
    pub default_status: String,
    pub default_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub id: DbId,
    pub job_id: DbId,
    pub row_number: RowNumber,
    pub raw_data: BTreeMap<String, String>,
    pub normalized_data: NormalizedData,
    pub status: RowStatus,
    pub lead_id: Option<LeadId>,
    pub message: Option<String>,
    /// Resolved action for a `valid` row.
    pub action: Option<RowAction>,
    pub existing_lead_id: Option<LeadId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewImportRow {
    pub row_number: RowNumber,
    pub raw_data: BTreeMap<String, String>,
    pub normalized_data: NormalizedData,
    pub status: RowStatus,
    pub message: Option<String>,
    pub action: Option<RowAction>,
    pub existing_lead_id: Option<LeadId>,
}

/// Final state of one processed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row_id: DbId,
    pub status: RowStatus,
    pub lead_id: Option<LeadId>,
    pub message: Option<String>,
    /// Resolved action for a `valid` row.
    pub action: Option<RowAction>,
    pub existing_lead_id: Option<LeadId>,
}

/// Number of rows of a job in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStatusCounts {
    pub valid: i64,
    pub skipped: i64,
    pub imported: i64,
    pub updated: i64,
    pub error: i64,
}

impl RowStatusCounts {
    pub fn total(&self) -> i64 {
        self.valid + self.skipped + self.imported + self.updated + self.error
    }

    /// Rows the worker has finished with.
    pub fn processed(&self) -> i64 {
        self.total() - self.valid
    }

    pub fn add(&mut self, status: RowStatus, n: i64) {
        match status {
            RowStatus::Valid => self.valid += n,
            RowStatus::Skipped => self.skipped += n,
            RowStatus::Imported => self.imported += n,
            RowStatus::Updated => self.updated += n,
            RowStatus::Error => self.error += n,
        }
    }

    pub fn summary(&self) -> ImportResultsSummary {
        ImportResultsSummary {
            total_rows: self.total(),
            imported_count: self.imported,
            updated_count: self.updated,
            skipped_count: self.skipped,
            error_count: self.error,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LeadStore: Send + Sync {
    // -- leads --

    /// Leads whose `field` equals one of `values`, compared case-insensitively.
    async fn find_leads_by_field(
        &self,
        field: FieldKey,
        values: &[String],
    ) -> Result<Vec<ExistingLeadSnapshot>, StoreError>;

    /// Insert leads in one statement. Ids are returned in input order.
    async fn insert_leads(&self, leads: &[NewLead]) -> Result<Vec<LeadId>, StoreError>;

    /// Overwrite the given fields and return the lead as it was before.
    async fn update_lead(&self, id: LeadId, update: &LeadUpdate) -> Result<ExistingLeadSnapshot, StoreError>;

    async fn insert_history(&self, entries: &[LeadHistoryEntry]) -> Result<(), StoreError>;

    async fn list_assignable_users(&self) -> Result<Vec<AssignableUser>, StoreError>;

    // -- jobs --

    async fn create_job(&self, job: &NewImportJob) -> Result<ImportJob, StoreError>;

    async fn find_job(&self, id: DbId) -> Result<Option<ImportJob>, StoreError>;

    /// Newest first.
    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<ImportJob>, StoreError>;

    /// Atomically move a committable job to `importing` under `token`.
    ///
    /// Succeeds when the job has no lease, already holds `token`, or its
    /// lease is older than `stale_after_secs`. Returns `false` otherwise,
    /// including when the job is missing or not committable. Resuming a
    /// cancelled job clears its completion time.
    async fn acquire_job_lease(&self, id: DbId, token: LeaseToken, stale_after_secs: i64)
        -> Result<bool, StoreError>;

    /// Clear the lease if `token` still holds it.
    async fn release_job_lease(&self, id: DbId, token: LeaseToken) -> Result<(), StoreError>;

    async fn update_job_progress(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError>;

    async fn complete_job(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError>;

    async fn fail_job(&self, id: DbId, message: &str) -> Result<(), StoreError>;

    async fn cancel_job(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError>;

    // -- rows --

    async fn insert_import_rows(&self, job_id: DbId, rows: &[NewImportRow]) -> Result<u64, StoreError>;

    /// Up to `limit` rows in `status` with `row_number > after_row`, ascending.
    async fn fetch_rows_by_status(
        &self,
        job_id: DbId,
        status: RowStatus,
        after_row: RowNumber,
        limit: i64,
    ) -> Result<Vec<ImportRow>, StoreError>;

    /// Apply many row outcomes in one round trip.
    async fn update_row_outcomes(&self, outcomes: &[RowOutcome]) -> Result<(), StoreError>;

    async fn count_rows_by_status(&self, job_id: DbId) -> Result<RowStatusCounts, StoreError>;

    /// Ascending by row number, optionally filtered by status.
    async fn list_rows(
        &self,
        job_id: DbId,
        status: Option<RowStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportRow>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_track_processed_rows() {
        let mut counts = RowStatusCounts::default();
        counts.add(RowStatus::Valid, 3);
        counts.add(RowStatus::Imported, 2);
        counts.add(RowStatus::Skipped, 1);
        counts.add(RowStatus::Error, 1);

        assert_eq!(counts.total(), 7);
        assert_eq!(counts.processed(), 4);
        let summary = counts.summary();
        assert_eq!(summary.imported_count, 2);
        assert_eq!(summary.error_count, 1);
    }
}
