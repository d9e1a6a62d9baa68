//! Models for the `import_jobs` table.

use leadimport_core::error::CoreError;
use leadimport_core::import_status::JobStatus;
use leadimport_core::importer::{AssignmentConfig, DuplicateConfig};
use leadimport_core::lead_store::{ImportJob, LeaseToken};
use leadimport_core::mapping::ColumnMapping;
use leadimport_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `import_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct ImportJobRow {
    pub id: DbId,
    pub status: String,
    pub file_name: String,
    pub file_type: String,
    pub total_rows: i64,
    pub valid_rows: i64,
    pub processed_rows: i64,
    pub imported_count: i64,
    pub updated_count: i64,
    pub skipped_count: i64,
    pub error_count: i64,
    pub mappings: Json<Vec<ColumnMapping>>,
    pub assignment_config: Json<AssignmentConfig>,
    pub duplicate_config: Json<DuplicateConfig>,
    pub default_status: String,
    pub default_source: String,
    pub error_message: Option<String>,
    pub lease_token: Option<LeaseToken>,
    pub lease_acquired_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl TryFrom<ImportJobRow> for ImportJob {
    type Error = CoreError;

    fn try_from(row: ImportJobRow) -> Result<Self, Self::Error> {
        Ok(ImportJob {
            id: row.id,
            status: JobStatus::from_str_db(&row.status)?,
            file_name: row.file_name,
            file_type: row.file_type,
            total_rows: row.total_rows,
            valid_rows: row.valid_rows,
            processed_rows: row.processed_rows,
            imported_count: row.imported_count,
            updated_count: row.updated_count,
            skipped_count: row.skipped_count,
            error_count: row.error_count,
            mappings: row.mappings.0,
            assignment_config: row.assignment_config.0,
            duplicate_config: row.duplicate_config.0,
            default_status: row.default_status,
            default_source: row.default_source,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}
