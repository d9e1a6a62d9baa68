//! Models for the `import_rows` table.

use std::collections::BTreeMap;

use leadimport_core::error::CoreError;
use leadimport_core::field::NormalizedData;
use leadimport_core::import_status::RowStatus;
use leadimport_core::importer::RowAction;
use leadimport_core::lead_store::ImportRow;
use leadimport_core::types::{DbId, LeadId, RowNumber, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `import_rows` table.
#[derive(Debug, Clone, FromRow)]
pub struct ImportRowRecord {
    pub id: DbId,
    pub job_id: DbId,
    pub row_number: RowNumber,
    pub raw_data: Json<BTreeMap<String, String>>,
    pub normalized_data: Json<NormalizedData>,
    pub status: String,
    pub lead_id: Option<LeadId>,
    pub message: Option<String>,
    pub action: Option<String>,
    pub existing_lead_id: Option<LeadId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ImportRowRecord> for ImportRow {
    type Error = CoreError;

    fn try_from(record: ImportRowRecord) -> Result<Self, Self::Error> {
        let action = record
            .action
            .as_deref()
            .map(|a| {
                RowAction::parse(a)
                    .ok_or_else(|| CoreError::Validation(format!("Invalid import row action '{a}'")))
            })
            .transpose()?;
        Ok(ImportRow {
            id: record.id,
            job_id: record.job_id,
            row_number: record.row_number,
            raw_data: record.raw_data.0,
            normalized_data: record.normalized_data.0,
            status: RowStatus::from_str_db(&record.status)?,
            lead_id: record.lead_id,
            message: record.message,
            action,
            existing_lead_id: record.existing_lead_id,
        })
    }
}

/// Per-status row count from a `GROUP BY status` query.
#[derive(Debug, Clone, FromRow)]
pub struct RowStatusCount {
    pub status: String,
    pub count: i64,
}
