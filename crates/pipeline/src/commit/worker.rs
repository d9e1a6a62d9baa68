//! The commit worker.
//!
//! Pages through a job's `valid` rows in ascending row order. Each fetched
//! batch is categorized first and then written in three passes (skips,
//! updates, creates) so every pass costs a bounded number of round trips.
//! A failing row is recorded as `error` and never aborts the batch.
//!
//! Everything the worker needs is read back from the store: assignment and
//! defaults from the job, the resolved action from each staged row. Running
//! it again on the same job id resumes where the last run stopped.

use std::collections::BTreeMap;

use leadimport_core::audit::LeadHistoryEntry;
use leadimport_core::field::{FieldKey, NormalizedData};
use leadimport_core::import_status::RowStatus;
use leadimport_core::importer::{ImportResultsSummary, RowAction};
use leadimport_core::lead::{LeadUpdate, NewLead};
use leadimport_core::lead_store::{ImportJob, ImportRow, LeadStore, LeaseToken, RowOutcome, RowStatusCounts};
use leadimport_core::progress::{ImportPhase, ImportProgress, ProgressCounters};
use leadimport_core::types::{DbId, LeadId};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::assignment::Assigner;
use crate::error::ImportError;
use crate::progress::ProgressSink;

/// Rows read from the store per batch.
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 1000;

/// Leads written per insert statement.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 100;

/// A lease not refreshed for this long may be taken over.
pub const DEFAULT_LEASE_STALE_AFTER_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    pub fetch_batch_size: usize,
    pub write_batch_size: usize,
    pub lease_stale_after_secs: i64,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
            lease_stale_after_secs: DEFAULT_LEASE_STALE_AFTER_SECS,
        }
    }
}

/// Commit every `valid` row of a job.
///
/// Takes the job's lease first: a missing job yields
/// [`ImportError::JobNotFound`], a completed or failed one
/// [`ImportError::JobNotReady`] and one leased by another worker
/// [`ImportError::JobBusy`]. A cancelled job, or one whose worker died and
/// left a stale lease, is resumed; only rows still `valid` are touched.
///
/// Cancellation is checked before each batch. A cancelled job keeps every
/// row settled so far; the rest stay `valid`. Any other error marks the job
/// failed and is returned.
pub async fn run_commit(
    store: &dyn LeadStore,
    job_id: DbId,
    options: CommitOptions,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<ImportResultsSummary, ImportError> {
    let token: LeaseToken = Uuid::new_v4();
    acquire_lease(store, job_id, token, options.lease_stale_after_secs).await?;

    let job = match store.find_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return Err(ImportError::JobNotFound(job_id)),
        Err(e) => {
            if let Err(release_err) = store.release_job_lease(job_id, token).await {
                tracing::warn!(job_id, error = %release_err, "Failed to release import job lease");
            }
            return Err(e.into());
        }
    };

    tracing::info!(job_id, "Commit started");

    let mut worker = CommitWorker {
        store,
        job_id,
        job,
        options: CommitOptions {
            fetch_batch_size: options.fetch_batch_size.max(1),
            write_batch_size: options.write_batch_size.max(1),
            ..options
        },
        progress,
        state: ImportProgress::new(job_id, 0, 0),
        counts: RowStatusCounts::default(),
    };
    let result = worker.run(cancel).await;

    match &result {
        Ok(summary) => tracing::info!(
            job_id,
            imported = summary.imported_count,
            updated = summary.updated_count,
            skipped = summary.skipped_count,
            errors = summary.error_count,
            "Commit completed",
        ),
        Err(ImportError::Cancelled(_)) => tracing::info!(job_id, "Commit cancelled"),
        Err(e) => {
            tracing::error!(job_id, error = %e, "Commit failed");
            if let Err(fail_err) = store.fail_job(job_id, &e.to_string()).await {
                tracing::error!(job_id, error = %fail_err, "Failed to mark import job failed");
            }
            worker.state.phase = ImportPhase::Failed;
            progress.report(&worker.state);
        }
    }

    if let Err(e) = store.release_job_lease(job_id, token).await {
        tracing::warn!(job_id, error = %e, "Failed to release import job lease");
    }

    result
}

async fn acquire_lease(
    store: &dyn LeadStore,
    job_id: DbId,
    token: LeaseToken,
    stale_after_secs: i64,
) -> Result<(), ImportError> {
    if store.acquire_job_lease(job_id, token, stale_after_secs).await? {
        return Ok(());
    }
    match store.find_job(job_id).await? {
        None => Err(ImportError::JobNotFound(job_id)),
        Some(job) if !job.status.is_committable() => Err(ImportError::JobNotReady {
            id: job_id,
            status: job.status.as_str().to_string(),
        }),
        Some(_) => Err(ImportError::JobBusy(job_id)),
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct CommitWorker<'a> {
    store: &'a dyn LeadStore,
    job_id: DbId,
    job: ImportJob,
    options: CommitOptions,
    progress: &'a dyn ProgressSink,
    state: ImportProgress,
    counts: RowStatusCounts,
}

/// What to do with one row.
#[derive(Debug)]
enum Categorized<'r> {
    Skip { row: &'r ImportRow, message: Option<String> },
    Update { row: &'r ImportRow, lead_id: LeadId },
    Create { row: &'r ImportRow },
}

impl<'a> CommitWorker<'a> {
    async fn run(&mut self, cancel: &CancellationToken) -> Result<ImportResultsSummary, ImportError> {
        let mut assigner = Assigner::prepare(self.store, &self.job.assignment_config).await?;

        self.counts = self.store.count_rows_by_status(self.job_id).await?;
        let fetch = self.options.fetch_batch_size;
        let total_batches = (self.counts.valid as usize).div_ceil(fetch) as u32;
        self.state = ImportProgress::new(self.job_id, self.counts.total(), total_batches);
        self.sync_state();
        self.state.phase = ImportPhase::Importing;
        self.progress.report(&self.state);

        let mut after_row = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancel().await?);
            }

            let rows = self
                .store
                .fetch_rows_by_status(self.job_id, RowStatus::Valid, after_row, fetch as i64)
                .await?;
            let Some(last) = rows.last() else {
                break;
            };
            after_row = last.row_number;
            self.state.current_batch += 1;

            tracing::debug!(
                job_id = self.job_id,
                batch = self.state.current_batch,
                rows = rows.len(),
                "Processing import batch",
            );

            self.process_batch(&rows, &mut assigner).await?;

            self.store.update_job_progress(self.job_id, &self.counts).await?;
            self.sync_state();
            self.progress.report(&self.state);
        }

        self.state.phase = ImportPhase::Finalizing;
        self.progress.report(&self.state);

        // Counts come from the row table so a re-run reports the same totals.
        let final_counts = self.store.count_rows_by_status(self.job_id).await?;
        self.store.complete_job(self.job_id, &final_counts).await?;

        self.counts = final_counts;
        self.sync_state();
        self.state.phase = ImportPhase::Completed;
        self.progress.report(&self.state);

        Ok(final_counts.summary())
    }

    async fn cancel(&mut self) -> Result<ImportError, ImportError> {
        let counts = self.store.count_rows_by_status(self.job_id).await?;
        self.store.cancel_job(self.job_id, &counts).await?;
        self.counts = counts;
        self.sync_state();
        self.state.phase = ImportPhase::Cancelled;
        self.progress.report(&self.state);
        Ok(ImportError::Cancelled(self.job_id))
    }

    fn sync_state(&mut self) {
        self.state.total_rows = self.counts.total();
        self.state.processed_rows = self.counts.processed();
        self.state.counters = ProgressCounters {
            imported: self.counts.imported,
            updated: self.counts.updated,
            skipped: self.counts.skipped,
            errors: self.counts.error,
        };
    }

    fn settle(&mut self, outcomes: &[RowOutcome]) {
        for outcome in outcomes {
            self.counts.valid -= 1;
            self.counts.add(outcome.status, 1);
        }
    }

    // -- categorize --

    fn categorize<'r>(&self, row: &'r ImportRow) -> Categorized<'r> {
        match (row.action.unwrap_or(RowAction::Create), row.existing_lead_id) {
            (RowAction::Skip, _) => Categorized::Skip {
                row,
                message: row.message.clone(),
            },
            (RowAction::Update, Some(lead_id)) => Categorized::Update { row, lead_id },
            // An update without a known existing lead falls back to create.
            (RowAction::Update, None) | (RowAction::Create, _) => Categorized::Create { row },
        }
    }

    async fn process_batch(&mut self, rows: &[ImportRow], assigner: &mut Assigner) -> Result<(), ImportError> {
        let mut skips = Vec::new();
        let mut updates = Vec::new();
        let mut creates = Vec::new();
        for row in rows {
            match self.categorize(row) {
                Categorized::Skip { row, message } => skips.push(RowOutcome {
                    row_id: row.id,
                    status: RowStatus::Skipped,
                    lead_id: None,
                    message,
                    action: None,
                    existing_lead_id: None,
                }),
                Categorized::Update { row, lead_id } => updates.push((row, lead_id)),
                Categorized::Create { row } => creates.push(row),
            }
        }

        if !skips.is_empty() {
            self.store.update_row_outcomes(&skips).await?;
            self.settle(&skips);
        }
        if !updates.is_empty() {
            self.update_pass(&updates).await?;
        }
        if !creates.is_empty() {
            self.create_pass(&creates, assigner).await?;
        }
        Ok(())
    }

    // -- update pass --

    async fn update_pass(&mut self, updates: &[(&ImportRow, LeadId)]) -> Result<(), ImportError> {
        let mut history = Vec::new();
        let mut outcomes = Vec::with_capacity(updates.len());

        for (row, lead_id) in updates {
            let update = LeadUpdate {
                fields: update_fields(&row.normalized_data),
                import_job_id: self.job_id,
            };
            match self.store.update_lead(*lead_id, &update).await {
                Ok(before) => {
                    let mut after = before.fields.clone();
                    after.extend(update.fields.clone());
                    history.push(LeadHistoryEntry::updated(*lead_id, self.job_id, &before.fields, &after));
                    outcomes.push(RowOutcome {
                        row_id: row.id,
                        status: RowStatus::Updated,
                        lead_id: Some(*lead_id),
                        message: None,
                        action: None,
                        existing_lead_id: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = self.job_id,
                        row = row.row_number,
                        lead_id = %lead_id,
                        error = %e,
                        "Lead update failed",
                    );
                    outcomes.push(RowOutcome {
                        row_id: row.id,
                        status: RowStatus::Error,
                        lead_id: None,
                        message: Some(format!("Update failed: {e}")),
                        action: None,
                        existing_lead_id: None,
                    });
                }
            }
        }

        for chunk in history.chunks(self.options.write_batch_size) {
            self.store.insert_history(chunk).await?;
        }
        self.store.update_row_outcomes(&outcomes).await?;
        self.settle(&outcomes);
        Ok(())
    }

    // -- create pass --

    async fn create_pass(&mut self, creates: &[&ImportRow], assigner: &mut Assigner) -> Result<(), ImportError> {
        for chunk in creates.chunks(self.options.write_batch_size) {
            let leads: Vec<NewLead> = chunk
                .iter()
                .map(|row| NewLead {
                    fields: self.create_fields(&row.normalized_data),
                    status: self.job.default_status.clone(),
                    assigned_to: assigner.assign(&row.raw_data),
                    import_job_id: self.job_id,
                })
                .collect();

            let results = self.insert_isolating_failures(chunk, &leads).await;

            let mut history = Vec::new();
            let mut outcomes = Vec::with_capacity(chunk.len());
            for ((row, lead), result) in chunk.iter().zip(&leads).zip(results) {
                match result {
                    Ok(lead_id) => {
                        history.push(LeadHistoryEntry::created(lead_id, self.job_id, &lead.fields));
                        outcomes.push(RowOutcome {
                            row_id: row.id,
                            status: RowStatus::Imported,
                            lead_id: Some(lead_id),
                            message: None,
                            action: None,
                            existing_lead_id: None,
                        });
                    }
                    Err(message) => outcomes.push(RowOutcome {
                        row_id: row.id,
                        status: RowStatus::Error,
                        lead_id: None,
                        message: Some(message),
                        action: None,
                        existing_lead_id: None,
                    }),
                }
            }

            if !history.is_empty() {
                self.store.insert_history(&history).await?;
            }
            self.store.update_row_outcomes(&outcomes).await?;
            self.settle(&outcomes);
        }
        Ok(())
    }

    /// Insert a chunk in one statement; when that fails, retry row by row
    /// so only the offending rows become errors.
    async fn insert_isolating_failures(&self, rows: &[&ImportRow], leads: &[NewLead]) -> Vec<Result<LeadId, String>> {
        match self.store.insert_leads(leads).await {
            Ok(ids) if ids.len() == leads.len() => return ids.into_iter().map(Ok).collect(),
            Ok(ids) => tracing::warn!(
                job_id = self.job_id,
                expected = leads.len(),
                returned = ids.len(),
                "Batch insert returned an unexpected number of ids, retrying row by row",
            ),
            Err(e) => tracing::warn!(
                job_id = self.job_id,
                rows = leads.len(),
                error = %e,
                "Batch insert failed, retrying row by row",
            ),
        }

        let mut results = Vec::with_capacity(leads.len());
        for (row, lead) in rows.iter().zip(leads) {
            let result = match self.store.insert_leads(std::slice::from_ref(lead)).await {
                Ok(ids) => ids
                    .first()
                    .copied()
                    .ok_or_else(|| "Insert failed: no id returned".to_string()),
                Err(e) => {
                    tracing::warn!(job_id = self.job_id, row = row.row_number, error = %e, "Lead insert failed");
                    Err(format!("Insert failed: {e}"))
                }
            };
            results.push(result);
        }
        results
    }

    fn create_fields(&self, normalized: &NormalizedData) -> NormalizedData {
        let mut fields = normalized.clone();
        fields
            .entry(FieldKey::Source)
            .or_insert_with(|| self.job.default_source.clone());
        fields
    }
}

/// Fields an update overwrites: every comparable field the row carries.
fn update_fields(normalized: &NormalizedData) -> NormalizedData {
    normalized
        .iter()
        .filter(|(field, value)| FieldKey::COMPARABLE.contains(*field) && !value.is_empty())
        .map(|(field, value)| (*field, value.clone()))
        .collect::<BTreeMap<_, _>>()
}
