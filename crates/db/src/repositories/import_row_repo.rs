//! Repository for the `import_rows` table.

use leadimport_core::lead_store::{NewImportRow, RowOutcome};
use leadimport_core::types::{DbId, RowNumber};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::import_row::{ImportRowRecord, RowStatusCount};

/// Column list for `import_rows` SELECT queries.
const COLUMNS: &str = "\
    id, job_id, row_number, raw_data, normalized_data, status, lead_id, \
    message, action, existing_lead_id, created_at, updated_at";

/// Column list for INSERT (excludes `id`, `lead_id` and timestamps).
const INSERT_COLUMNS: &str = "\
    job_id, row_number, raw_data, normalized_data, status, message, action, \
    existing_lead_id";

/// Rows per statement, keeping bind parameters well under PostgreSQL's limit.
const CHUNK_SIZE: usize = 1000;

/// Provides staging, paging and outcome updates for import rows.
pub struct ImportRowRepo;

impl ImportRowRepo {
    /// Stage all rows of a job in one transaction.
    pub async fn batch_insert(pool: &PgPool, job_id: DbId, rows: &[NewImportRow]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(CHUNK_SIZE) {
            let query = format!(
                "INSERT INTO import_rows ({INSERT_COLUMNS}) VALUES {}",
                values_placeholders(chunk.len(), 8, &[])
            );
            let mut q = sqlx::query(&query);
            for row in chunk {
                q = q
                    .bind(job_id)
                    .bind(row.row_number)
                    .bind(Json(&row.raw_data))
                    .bind(Json(&row.normalized_data))
                    .bind(row.status.as_str())
                    .bind(&row.message)
                    .bind(row.action.map(|a| a.as_str()))
                    .bind(row.existing_lead_id);
            }
            inserted += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Page through a job's rows in one status, ascending by row number.
    pub async fn fetch_by_status(
        pool: &PgPool,
        job_id: DbId,
        status: &str,
        after_row: RowNumber,
        limit: i64,
    ) -> Result<Vec<ImportRowRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_rows \
             WHERE job_id = $1 AND status = $2 AND row_number > $3 \
             ORDER BY row_number ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, ImportRowRecord>(&query)
            .bind(job_id)
            .bind(status)
            .bind(after_row)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Apply many outcomes with one `UPDATE ... FROM (VALUES ...)` per chunk.
    pub async fn batch_update_outcomes(pool: &PgPool, outcomes: &[RowOutcome]) -> Result<u64, sqlx::Error> {
        let mut updated = 0u64;

        for chunk in outcomes.chunks(CHUNK_SIZE) {
            let query = format!(
                "UPDATE import_rows AS r \
                 SET status = u.status, lead_id = u.lead_id, message = u.message \
                 FROM (VALUES {}) AS u(id, status, lead_id, message) \
                 WHERE r.id = u.id",
                values_placeholders(chunk.len(), 4, &["BIGINT", "TEXT", "UUID", "TEXT"])
            );
            let mut q = sqlx::query(&query);
            for outcome in chunk {
                q = q
                    .bind(outcome.row_id)
                    .bind(outcome.status.as_str())
                    .bind(outcome.lead_id)
                    .bind(&outcome.message);
            }
            updated += q.execute(pool).await?.rows_affected();
        }

        Ok(updated)
    }

    pub async fn count_by_status(pool: &PgPool, job_id: DbId) -> Result<Vec<RowStatusCount>, sqlx::Error> {
        sqlx::query_as::<_, RowStatusCount>(
            "SELECT status, COUNT(*)::BIGINT AS count FROM import_rows \
             WHERE job_id = $1 GROUP BY status",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }

    /// List a job's rows ascending by row number, optionally by status.
    pub async fn list(
        pool: &PgPool,
        job_id: DbId,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportRowRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_rows \
             WHERE job_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY row_number ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, ImportRowRecord>(&query)
            .bind(job_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}

/// `($1, $2), ($3, $4), ...` for `rows` tuples of `width` parameters.
///
/// When `casts` is non-empty each placeholder gets the matching `::TYPE`.
fn values_placeholders(rows: usize, width: usize, casts: &[&str]) -> String {
    let mut out = String::new();
    let mut param_idx = 1usize;
    for r in 0..rows {
        if r > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for c in 0..width {
            if c > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("${param_idx}"));
            if let Some(cast) = casts.get(c) {
                out.push_str("::");
                out.push_str(cast);
            }
            param_idx += 1;
        }
        out.push(')');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_without_casts() {
        assert_eq!(values_placeholders(2, 3, &[]), "($1, $2, $3), ($4, $5, $6)");
    }

    #[test]
    fn placeholders_with_casts() {
        assert_eq!(
            values_placeholders(2, 2, &["BIGINT", "TEXT"]),
            "($1::BIGINT, $2::TEXT), ($3::BIGINT, $4::TEXT)"
        );
    }
}
