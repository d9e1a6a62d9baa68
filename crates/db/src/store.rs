//! [`LeadStore`] backed by PostgreSQL.

use async_trait::async_trait;
use leadimport_core::audit::LeadHistoryEntry;
use leadimport_core::error::CoreError;
use leadimport_core::field::FieldKey;
use leadimport_core::import_status::{JobStatus, RowStatus};
use leadimport_core::lead::{AssignableUser, ExistingLeadSnapshot, LeadUpdate, NewLead};
use leadimport_core::lead_store::{
    ImportJob, ImportRow, LeadStore, LeaseToken, NewImportJob, NewImportRow, RowOutcome,
    RowStatusCounts, StoreError,
};
use leadimport_core::types::{DbId, LeadId, RowNumber};

use crate::repositories::{ImportJobRepo, ImportRowRepo, LeadHistoryRepo, LeadRepo, UserRepo};
use crate::DbPool;

/// PostgreSQL lead store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgLeadStore {
    pool: DbPool,
}

impl PgLeadStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a sqlx error onto the store's error kinds.
///
/// Unique (23505) and foreign-key (23503) violations become
/// [`StoreError::Constraint`]; pool and I/O failures become
/// [`StoreError::Unavailable`].
fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") | Some("23503") | Some("23514") | Some("23502") => {
                StoreError::Constraint(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

fn decode_error(err: CoreError) -> StoreError {
    StoreError::Database(format!("Corrupt stored value: {err}"))
}

fn job_not_found(id: DbId) -> StoreError {
    StoreError::NotFound {
        entity: "ImportJob",
        id: id.to_string(),
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn find_leads_by_field(
        &self,
        field: FieldKey,
        values: &[String],
    ) -> Result<Vec<ExistingLeadSnapshot>, StoreError> {
        let leads = LeadRepo::find_by_field_values(&self.pool, field, values)
            .await
            .map_err(store_error)?;
        Ok(leads.iter().map(|l| l.snapshot()).collect())
    }

    async fn insert_leads(&self, leads: &[NewLead]) -> Result<Vec<LeadId>, StoreError> {
        LeadRepo::batch_insert(&self.pool, leads).await.map_err(store_error)
    }

    async fn update_lead(&self, id: LeadId, update: &LeadUpdate) -> Result<ExistingLeadSnapshot, StoreError> {
        LeadRepo::update_fields(&self.pool, id, update)
            .await
            .map_err(store_error)?
            .map(|before| before.snapshot())
            .ok_or_else(|| StoreError::NotFound {
                entity: "Lead",
                id: id.to_string(),
            })
    }

    async fn insert_history(&self, entries: &[LeadHistoryEntry]) -> Result<(), StoreError> {
        LeadHistoryRepo::batch_insert(&self.pool, entries)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn list_assignable_users(&self) -> Result<Vec<AssignableUser>, StoreError> {
        let users = UserRepo::list_assignable(&self.pool).await.map_err(store_error)?;
        Ok(users.into_iter().map(AssignableUser::from).collect())
    }

    async fn create_job(&self, job: &NewImportJob) -> Result<ImportJob, StoreError> {
        let row = ImportJobRepo::create(&self.pool, job).await.map_err(store_error)?;
        ImportJob::try_from(row).map_err(decode_error)
    }

    async fn find_job(&self, id: DbId) -> Result<Option<ImportJob>, StoreError> {
        ImportJobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_error)?
            .map(ImportJob::try_from)
            .transpose()
            .map_err(decode_error)
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<ImportJob>, StoreError> {
        ImportJobRepo::list(&self.pool, limit, offset)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|row| ImportJob::try_from(row).map_err(decode_error))
            .collect()
    }

    async fn acquire_job_lease(
        &self,
        id: DbId,
        token: LeaseToken,
        stale_after_secs: i64,
    ) -> Result<bool, StoreError> {
        ImportJobRepo::acquire_lease(&self.pool, id, token, stale_after_secs)
            .await
            .map_err(store_error)
    }

    async fn release_job_lease(&self, id: DbId, token: LeaseToken) -> Result<(), StoreError> {
        ImportJobRepo::release_lease(&self.pool, id, token)
            .await
            .map_err(store_error)
    }

    async fn update_job_progress(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError> {
        let found = ImportJobRepo::update_progress(&self.pool, id, counts)
            .await
            .map_err(store_error)?;
        found.then_some(()).ok_or_else(|| job_not_found(id))
    }

    async fn complete_job(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError> {
        let found = ImportJobRepo::finish(&self.pool, id, JobStatus::Completed, counts)
            .await
            .map_err(store_error)?;
        found.then_some(()).ok_or_else(|| job_not_found(id))
    }

    async fn fail_job(&self, id: DbId, message: &str) -> Result<(), StoreError> {
        let found = ImportJobRepo::fail(&self.pool, id, message)
            .await
            .map_err(store_error)?;
        found.then_some(()).ok_or_else(|| job_not_found(id))
    }

    async fn cancel_job(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError> {
        let found = ImportJobRepo::finish(&self.pool, id, JobStatus::Cancelled, counts)
            .await
            .map_err(store_error)?;
        found.then_some(()).ok_or_else(|| job_not_found(id))
    }

    async fn insert_import_rows(&self, job_id: DbId, rows: &[NewImportRow]) -> Result<u64, StoreError> {
        ImportRowRepo::batch_insert(&self.pool, job_id, rows)
            .await
            .map_err(store_error)
    }

    async fn fetch_rows_by_status(
        &self,
        job_id: DbId,
        status: RowStatus,
        after_row: RowNumber,
        limit: i64,
    ) -> Result<Vec<ImportRow>, StoreError> {
        ImportRowRepo::fetch_by_status(&self.pool, job_id, status.as_str(), after_row, limit)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|r| ImportRow::try_from(r).map_err(decode_error))
            .collect()
    }

    async fn update_row_outcomes(&self, outcomes: &[RowOutcome]) -> Result<(), StoreError> {
        ImportRowRepo::batch_update_outcomes(&self.pool, outcomes)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn count_rows_by_status(&self, job_id: DbId) -> Result<RowStatusCounts, StoreError> {
        let rows = ImportRowRepo::count_by_status(&self.pool, job_id)
            .await
            .map_err(store_error)?;
        let mut counts = RowStatusCounts::default();
        for row in rows {
            let status = RowStatus::from_str_db(&row.status).map_err(decode_error)?;
            counts.add(status, row.count);
        }
        Ok(counts)
    }

    async fn list_rows(
        &self,
        job_id: DbId,
        status: Option<RowStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportRow>, StoreError> {
        ImportRowRepo::list(&self.pool, job_id, status.map(|s| s.as_str()), limit, offset)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|r| ImportRow::try_from(r).map_err(decode_error))
            .collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(store_error)
    }
}
