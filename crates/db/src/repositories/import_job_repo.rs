//! Repository for the `import_jobs` table.

use leadimport_core::import_status::JobStatus;
use leadimport_core::lead_store::{LeaseToken, NewImportJob, RowStatusCounts};
use leadimport_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::import_job::ImportJobRow;

/// Column list for `import_jobs` SELECT queries.
const COLUMNS: &str = "\
    id, status, file_name, file_type, total_rows, valid_rows, processed_rows, \
    imported_count, updated_count, skipped_count, error_count, mappings, \
    assignment_config, duplicate_config, default_status, default_source, \
    error_message, lease_token, lease_acquired_at, created_at, started_at, \
    completed_at, updated_at";

/// Provides CRUD, lease and progress operations for import jobs.
pub struct ImportJobRepo;

impl ImportJobRepo {
    /// Insert a new job in `ready` status.
    pub async fn create(pool: &PgPool, input: &NewImportJob) -> Result<ImportJobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_jobs \
                (file_name, file_type, total_rows, valid_rows, mappings, \
                 assignment_config, duplicate_config, default_status, default_source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(&input.file_name)
            .bind(&input.file_type)
            .bind(input.total_rows)
            .bind(input.valid_rows)
            .bind(Json(&input.mappings))
            .bind(Json(&input.assignment_config))
            .bind(Json(&input.duplicate_config))
            .bind(&input.default_status)
            .bind(&input.default_source)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImportJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_jobs WHERE id = $1");
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs, newest first.
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<ImportJobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Compare-and-set the lease and move the job to `importing`.
    ///
    /// Takes the lease when it is free, already held by `token`, or older
    /// than `stale_after_secs`. Returns whether the lease is now held.
    pub async fn acquire_lease(
        pool: &PgPool,
        id: DbId,
        token: LeaseToken,
        stale_after_secs: i64,
    ) -> Result<bool, sqlx::Error> {
        let committable: Vec<&str> = JobStatus::COMMITTABLE.iter().map(|s| s.as_str()).collect();
        let acquired = sqlx::query_scalar::<_, DbId>(
            "UPDATE import_jobs \
             SET status = 'importing', lease_token = $2, lease_acquired_at = NOW(), \
                 started_at = COALESCE(started_at, NOW()), completed_at = NULL \
             WHERE id = $1 \
               AND status = ANY($3) \
               AND (lease_token IS NULL \
                    OR lease_token = $2 \
                    OR lease_acquired_at < NOW() - make_interval(secs => $4)) \
             RETURNING id",
        )
        .bind(id)
        .bind(token)
        .bind(&committable)
        .bind(stale_after_secs as f64)
        .fetch_optional(pool)
        .await?;
        Ok(acquired.is_some())
    }

    /// Clear the lease if `token` still holds it.
    pub async fn release_lease(pool: &PgPool, id: DbId, token: LeaseToken) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs SET lease_token = NULL, lease_acquired_at = NULL \
             WHERE id = $1 AND lease_token = $2",
        )
        .bind(id)
        .bind(token)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Store running counters and refresh the lease heartbeat.
    pub async fn update_progress(pool: &PgPool, id: DbId, counts: &RowStatusCounts) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET processed_rows = $2, imported_count = $3, updated_count = $4, \
                 skipped_count = $5, error_count = $6, \
                 lease_acquired_at = CASE WHEN lease_token IS NULL THEN lease_acquired_at ELSE NOW() END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(counts.processed())
        .bind(counts.imported)
        .bind(counts.updated)
        .bind(counts.skipped)
        .bind(counts.error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move the job to a terminal status with its final counters.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        status: JobStatus,
        counts: &RowStatusCounts,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status = $2, processed_rows = $3, imported_count = $4, updated_count = $5, \
                 skipped_count = $6, error_count = $7, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(counts.processed())
        .bind(counts.imported)
        .bind(counts.updated)
        .bind(counts.skipped)
        .bind(counts.error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn fail(pool: &PgPool, id: DbId, message: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status = 'failed', error_message = $2, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
