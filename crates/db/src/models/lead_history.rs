//! Models for the append-only `lead_history` table.

use leadimport_core::types::{DbId, LeadId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `lead_history` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeadHistory {
    pub id: DbId,
    pub lead_id: LeadId,
    pub action: String,
    pub import_job_id: Option<DbId>,
    pub changes: serde_json::Value,
    pub created_at: Timestamp,
}
