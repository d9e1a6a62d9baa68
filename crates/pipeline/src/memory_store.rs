//! In-memory [`LeadStore`] used by tests and local runs without a database.
//!
//! Besides the store contract it records lookup and insert batch sizes and
//! can be told to fail lookups or reject specific leads, so batching and
//! error isolation can be asserted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use leadimport_core::audit::LeadHistoryEntry;
use leadimport_core::field::{FieldKey, NormalizedData};
use leadimport_core::import_status::{JobStatus, RowStatus};
use leadimport_core::lead::{AssignableUser, ExistingLeadSnapshot, LeadUpdate, NewLead};
use leadimport_core::lead_store::{
    ImportJob, ImportRow, LeadStore, LeaseToken, NewImportJob, NewImportRow, RowOutcome,
    RowStatusCounts, StoreError,
};
use leadimport_core::normalize::match_key;
use leadimport_core::types::{DbId, LeadId, RowNumber, Timestamp, UserId};
use uuid::Uuid;

/// A lead as held by the memory store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLead {
    pub id: LeadId,
    pub fields: NormalizedData,
    pub status: String,
    pub assigned_to: Option<UserId>,
    pub import_job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StoredLead {
    fn snapshot(&self) -> ExistingLeadSnapshot {
        ExistingLeadSnapshot {
            id: self.id,
            fields: self.fields.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
struct StoredJob {
    job: ImportJob,
    lease: Option<(LeaseToken, Timestamp)>,
}

#[derive(Debug, Default)]
struct Inner {
    leads: Vec<StoredLead>,
    history: Vec<LeadHistoryEntry>,
    users: Vec<AssignableUser>,
    jobs: BTreeMap<DbId, StoredJob>,
    rows: BTreeMap<DbId, ImportRow>,
    next_job_id: DbId,
    next_row_id: DbId,
    lookup_sizes: Vec<usize>,
    insert_sizes: Vec<usize>,
    fail_lookups: bool,
    fail_row_updates: bool,
    unavailable: bool,
    rejected_emails: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryLeadStore {
    inner: Mutex<Inner>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- seeding --

    /// Insert an existing lead outside of any import.
    pub fn seed_lead(&self, fields: NormalizedData) -> LeadId {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.lock().leads.push(StoredLead {
            id,
            fields,
            status: "new".into(),
            assigned_to: None,
            import_job_id: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn seed_user(&self, display_name: &str, email: &str) -> UserId {
        let id = Uuid::new_v4();
        self.lock().users.push(AssignableUser {
            id,
            display_name: display_name.to_string(),
            email: email.to_string(),
        });
        id
    }

    // -- fault injection --

    /// Make every duplicate lookup fail as if the database were unreachable.
    pub fn fail_lookups(&self, fail: bool) {
        self.lock().fail_lookups = fail;
    }

    /// Make row outcome updates fail, which aborts a running commit.
    pub fn fail_row_updates(&self, fail: bool) {
        self.lock().fail_row_updates = fail;
    }

    /// Make health checks fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Reject any insert statement containing a lead with this email.
    pub fn reject_email(&self, email: &str) {
        self.lock().rejected_emails.insert(match_key(email));
    }

    // -- inspection --

    pub fn leads(&self) -> Vec<StoredLead> {
        self.lock().leads.clone()
    }

    pub fn lead(&self, id: LeadId) -> Option<StoredLead> {
        self.lock().leads.iter().find(|l| l.id == id).cloned()
    }

    pub fn history(&self) -> Vec<LeadHistoryEntry> {
        self.lock().history.clone()
    }

    /// Number of values in each lookup, in call order.
    pub fn lookup_sizes(&self) -> Vec<usize> {
        self.lock().lookup_sizes.clone()
    }

    /// Number of leads in each insert statement, in call order.
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.lock().insert_sizes.clone()
    }

    /// Current lease holder of a job.
    pub fn lease_of(&self, job_id: DbId) -> Option<LeaseToken> {
        self.lock().jobs.get(&job_id).and_then(|j| j.lease.map(|(t, _)| t))
    }
}

fn job_not_found(id: DbId) -> StoreError {
    StoreError::NotFound {
        entity: "ImportJob",
        id: id.to_string(),
    }
}

impl Inner {
    fn job_mut(&mut self, id: DbId) -> Result<&mut ImportJob, StoreError> {
        self.jobs
            .get_mut(&id)
            .map(|j| &mut j.job)
            .ok_or_else(|| job_not_found(id))
    }
}

fn apply_counts(job: &mut ImportJob, counts: &RowStatusCounts) {
    job.processed_rows = counts.processed();
    job.imported_count = counts.imported;
    job.updated_count = counts.updated;
    job.skipped_count = counts.skipped;
    job.error_count = counts.error;
    job.updated_at = Utc::now();
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn find_leads_by_field(
        &self,
        field: FieldKey,
        values: &[String],
    ) -> Result<Vec<ExistingLeadSnapshot>, StoreError> {
        let mut inner = self.lock();
        inner.lookup_sizes.push(values.len());
        if inner.fail_lookups {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        let wanted: BTreeSet<String> = values.iter().map(|v| match_key(v)).collect();
        Ok(inner
            .leads
            .iter()
            .filter(|l| l.fields.get(&field).is_some_and(|v| wanted.contains(&match_key(v))))
            .map(StoredLead::snapshot)
            .collect())
    }

    async fn insert_leads(&self, leads: &[NewLead]) -> Result<Vec<LeadId>, StoreError> {
        let mut inner = self.lock();
        inner.insert_sizes.push(leads.len());

        let rejected = leads.iter().any(|l| {
            l.fields
                .get(&FieldKey::Email)
                .is_some_and(|e| inner.rejected_emails.contains(&match_key(e)))
        });
        if rejected {
            return Err(StoreError::Constraint(
                "duplicate key value violates unique constraint \"uq_leads_email\"".into(),
            ));
        }

        let now = Utc::now();
        let ids: Vec<LeadId> = leads.iter().map(|_| Uuid::new_v4()).collect();
        for (lead, id) in leads.iter().zip(&ids) {
            inner.leads.push(StoredLead {
                id: *id,
                fields: lead.fields.clone(),
                status: lead.status.clone(),
                assigned_to: lead.assigned_to,
                import_job_id: Some(lead.import_job_id),
                created_at: now,
                updated_at: now,
            });
        }
        Ok(ids)
    }

    async fn update_lead(&self, id: LeadId, update: &LeadUpdate) -> Result<ExistingLeadSnapshot, StoreError> {
        let mut inner = self.lock();
        let lead = inner
            .leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "Lead",
                id: id.to_string(),
            })?;
        let before = lead.snapshot();
        for (field, value) in &update.fields {
            lead.fields.insert(*field, value.clone());
        }
        lead.updated_at = Utc::now();
        Ok(before)
    }

    async fn insert_history(&self, entries: &[LeadHistoryEntry]) -> Result<(), StoreError> {
        self.lock().history.extend_from_slice(entries);
        Ok(())
    }

    async fn list_assignable_users(&self) -> Result<Vec<AssignableUser>, StoreError> {
        Ok(self.lock().users.clone())
    }

    async fn create_job(&self, input: &NewImportJob) -> Result<ImportJob, StoreError> {
        let mut inner = self.lock();
        inner.next_job_id += 1;
        let now = Utc::now();
        let job = ImportJob {
            id: inner.next_job_id,
            status: JobStatus::Ready,
            file_name: input.file_name.clone(),
            file_type: input.file_type.clone(),
            total_rows: input.total_rows,
            valid_rows: input.valid_rows,
            processed_rows: 0,
            imported_count: 0,
            updated_count: 0,
            skipped_count: 0,
            error_count: 0,
            mappings: input.mappings.clone(),
            assignment_config: input.assignment_config.clone(),
            duplicate_config: input.duplicate_config.clone(),
            default_status: input.default_status.clone(),
            default_source: input.default_source.clone(),
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        inner.jobs.insert(job.id, StoredJob { job: job.clone(), lease: None });
        Ok(job)
    }

    async fn find_job(&self, id: DbId) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.lock().jobs.get(&id).map(|j| j.job.clone()))
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<ImportJob>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|j| j.job.clone())
            .collect())
    }

    async fn acquire_job_lease(
        &self,
        id: DbId,
        token: LeaseToken,
        stale_after_secs: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(stored) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if !stored.job.status.is_committable() {
            return Ok(false);
        }
        let now = Utc::now();
        let free = match stored.lease {
            None => true,
            Some((holder, _)) if holder == token => true,
            Some((_, at)) => (now - at).num_seconds() > stale_after_secs,
        };
        if !free {
            return Ok(false);
        }
        stored.lease = Some((token, now));
        stored.job.status = JobStatus::Importing;
        stored.job.started_at.get_or_insert(now);
        stored.job.completed_at = None;
        stored.job.updated_at = now;
        Ok(true)
    }

    async fn release_job_lease(&self, id: DbId, token: LeaseToken) -> Result<(), StoreError> {
        if let Some(stored) = self.lock().jobs.get_mut(&id) {
            if stored.lease.is_some_and(|(holder, _)| holder == token) {
                stored.lease = None;
            }
        }
        Ok(())
    }

    async fn update_job_progress(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let stored = inner.jobs.get_mut(&id).ok_or_else(|| job_not_found(id))?;
        apply_counts(&mut stored.job, counts);
        if let Some((_, at)) = stored.lease.as_mut() {
            *at = Utc::now();
        }
        Ok(())
    }

    async fn complete_job(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        apply_counts(job, counts);
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_job(&self, id: DbId, message: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Failed;
        job.error_message = Some(message.to_string());
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn cancel_job(&self, id: DbId, counts: &RowStatusCounts) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        apply_counts(job, counts);
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn insert_import_rows(&self, job_id: DbId, rows: &[NewImportRow]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::Constraint(format!("import job {job_id} does not exist")));
        }
        let existing: BTreeSet<RowNumber> = inner
            .rows
            .values()
            .filter(|r| r.job_id == job_id)
            .map(|r| r.row_number)
            .collect();
        let mut incoming = BTreeSet::new();
        for row in rows {
            if existing.contains(&row.row_number) || !incoming.insert(row.row_number) {
                return Err(StoreError::Constraint(format!(
                    "row {} already staged for job {job_id}",
                    row.row_number
                )));
            }
        }
        for row in rows {
            inner.next_row_id += 1;
            let id = inner.next_row_id;
            inner.rows.insert(
                id,
                ImportRow {
                    id,
                    job_id,
                    row_number: row.row_number,
                    raw_data: row.raw_data.clone(),
                    normalized_data: row.normalized_data.clone(),
                    status: row.status,
                    lead_id: None,
                    message: row.message.clone(),
                    action: row.action,
                    existing_lead_id: row.existing_lead_id,
                },
            );
        }
        Ok(rows.len() as u64)
    }

    async fn fetch_rows_by_status(
        &self,
        job_id: DbId,
        status: RowStatus,
        after_row: RowNumber,
        limit: i64,
    ) -> Result<Vec<ImportRow>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<ImportRow> = inner
            .rows
            .values()
            .filter(|r| r.job_id == job_id && r.status == status && r.row_number > after_row)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row_number);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn update_row_outcomes(&self, outcomes: &[RowOutcome]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_row_updates {
            return Err(StoreError::Database("deadlock detected".into()));
        }
        for outcome in outcomes {
            if let Some(row) = inner.rows.get_mut(&outcome.row_id) {
                row.status = outcome.status;
                row.lead_id = outcome.lead_id;
                row.message = outcome.message.clone();
            }
        }
        Ok(())
    }

    async fn count_rows_by_status(&self, job_id: DbId) -> Result<RowStatusCounts, StoreError> {
        let mut counts = RowStatusCounts::default();
        for row in self.lock().rows.values().filter(|r| r.job_id == job_id) {
            counts.add(row.status, 1);
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
        let inner = self.lock();
        let mut rows: Vec<ImportRow> = inner
            .rows
            .values()
            .filter(|r| r.job_id == job_id && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row_number);
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.lock().unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}
