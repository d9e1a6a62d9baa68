//! Repository for the append-only `lead_history` table.

use leadimport_core::audit::LeadHistoryEntry;
use leadimport_core::types::LeadId;
use sqlx::PgPool;

use crate::models::lead_history::LeadHistory;

const COLUMNS: &str = "id, lead_id, action, import_job_id, changes, created_at";

/// Column list for INSERT (excludes auto-generated `id` and `created_at`).
const INSERT_COLUMNS: &str = "lead_id, action, import_job_id, changes";

/// Provides insert and query operations for lead history.
pub struct LeadHistoryRepo;

impl LeadHistoryRepo {
    /// Batch insert history entries with a single multi-row INSERT.
    pub async fn batch_insert(pool: &PgPool, entries: &[LeadHistoryEntry]) -> Result<u64, sqlx::Error> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut query = format!("INSERT INTO lead_history ({INSERT_COLUMNS}) VALUES ");
        let mut param_idx = 1u32;
        let mut first = true;

        for _ in entries {
            if !first {
                query.push_str(", ");
            }
            first = false;
            query.push('(');
            for i in 0..4 {
                if i > 0 {
                    query.push_str(", ");
                }
                query.push_str(&format!("${param_idx}"));
                param_idx += 1;
            }
            query.push(')');
        }

        let mut q = sqlx::query(&query);
        for entry in entries {
            q = q
                .bind(entry.lead_id)
                .bind(&entry.action)
                .bind(entry.import_job_id)
                .bind(&entry.changes);
        }

        Ok(q.execute(pool).await?.rows_affected())
    }

    /// History of one lead, newest first.
    pub async fn list_for_lead(pool: &PgPool, lead_id: LeadId) -> Result<Vec<LeadHistory>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lead_history WHERE lead_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, LeadHistory>(&query)
            .bind(lead_id)
            .fetch_all(pool)
            .await
    }
}
