//! Registry of commit workers running in this process.
//!
//! Each running job has a cancellation token and a `watch` channel carrying
//! its latest progress. The entry disappears once the worker returns; from
//! then on the persisted job row is the source of truth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use leadimport_core::importer::ImportResultsSummary;
use leadimport_core::lead_store::LeadStore;
use leadimport_core::progress::ImportProgress;
use leadimport_core::types::DbId;
use leadimport_pipeline::commit::{run_commit, CommitOptions};
use leadimport_pipeline::progress::WatchProgress;
use leadimport_pipeline::ImportError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct RunningImport {
    cancel: CancellationToken,
    progress: watch::Receiver<ImportProgress>,
}

pub struct ImportRegistry {
    running: Mutex<HashMap<DbId, RunningImport>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Default for ImportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportRegistry {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DbId, RunningImport>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the commit of a staged job on a background task. The same call
    /// resumes a cancelled or abandoned job.
    ///
    /// The returned handle resolves to the worker's result; dropping it
    /// leaves the worker running.
    pub fn spawn_commit(
        self: &Arc<Self>,
        store: Arc<dyn LeadStore>,
        job_id: DbId,
        total_rows: i64,
        options: CommitOptions,
    ) -> JoinHandle<Result<ImportResultsSummary, ImportError>> {
        let cancel = self.shutdown.child_token();
        let (sink, progress) = WatchProgress::new(ImportProgress::new(job_id, total_rows, 0));

        self.lock().insert(
            job_id,
            RunningImport {
                cancel: cancel.clone(),
                progress,
            },
        );

        let registry = Arc::clone(self);
        self.tracker.spawn(async move {
            let result = run_commit(store.as_ref(), job_id, options, &sink, &cancel).await;
            registry.lock().remove(&job_id);
            if let Err(e) = &result {
                tracing::debug!(job_id, error = %e, "Background commit ended with an error");
            }
            result
        })
    }

    pub fn is_running(&self, job_id: DbId) -> bool {
        self.lock().contains_key(&job_id)
    }

    /// Latest progress of a running job.
    pub fn progress(&self, job_id: DbId) -> Option<ImportProgress> {
        self.lock().get(&job_id).map(|r| r.progress.borrow().clone())
    }

    /// Ask a running job to stop after its current batch. Returns `false`
    /// when the job is not running here.
    pub fn cancel(&self, job_id: DbId) -> bool {
        match self.lock().get(&job_id) {
            Some(running) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.lock().len()
    }

    /// Cancel every running job and wait up to `timeout` for the workers to
    /// settle their current batch.
    pub async fn shutdown(&self, timeout: Duration) {
        let running = self.running_count();
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(running, timeout_secs = timeout.as_secs(), "Import workers did not stop in time");
        } else {
            tracing::info!(running, "Import workers stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use leadimport_core::field::FieldKey;
    use leadimport_core::importer::{CommitRequest, CommitRow};
    use leadimport_core::parser::FileType;
    use leadimport_core::validation::evaluator::validate_mapped;
    use leadimport_pipeline::commit::submit_import;
    use leadimport_pipeline::memory_store::MemoryLeadStore;

    use super::*;

    fn request(count: i32) -> CommitRequest {
        let rows: Vec<CommitRow> = (1..=count)
            .map(|n| {
                let mapped = BTreeMap::from([(FieldKey::Email, format!("user{n}@example.com"))]);
                CommitRow {
                    validation: validate_mapped(n, &mapped),
                    raw_data: BTreeMap::new(),
                }
            })
            .collect();
        CommitRequest {
            file_name: "leads.csv".into(),
            file_type: FileType::Csv,
            total_rows: rows.len(),
            validated_rows: rows,
            mappings: Vec::new(),
            assignment_config: Default::default(),
            duplicate_config: Default::default(),
            row_actions: Vec::new(),
            db_duplicate_info: Vec::new(),
            edited_rows: BTreeMap::new(),
            default_status: None,
            default_source: None,
        }
    }

    async fn staged_job(store: &MemoryLeadStore, count: i32) -> DbId {
        submit_import(store, request(count)).await.unwrap().job.id
    }

    #[tokio::test]
    async fn finished_worker_leaves_the_registry() {
        let store = Arc::new(MemoryLeadStore::new());
        let registry = Arc::new(ImportRegistry::new());
        let job_id = staged_job(&store, 3).await;

        let handle = registry.spawn_commit(store.clone(), job_id, 3, CommitOptions::default());
        assert!(registry.is_running(job_id));
        assert_eq!(registry.progress(job_id).map(|p| p.total_rows), Some(3));

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.imported_count, 3);
        assert!(!registry.is_running(job_id));
        assert!(registry.progress(job_id).is_none());
    }

    #[tokio::test]
    async fn cancel_stops_the_worker_before_its_first_batch() {
        let store = Arc::new(MemoryLeadStore::new());
        let registry = Arc::new(ImportRegistry::new());
        let job_id = staged_job(&store, 2).await;

        let handle = registry.spawn_commit(store.clone(), job_id, 2, CommitOptions::default());
        assert!(registry.cancel(job_id));
        assert!(!registry.cancel(job_id + 1));

        assert_matches!(handle.await.unwrap(), Err(ImportError::Cancelled(id)) if id == job_id);
        assert!(store.leads().is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_running_workers() {
        let store = Arc::new(MemoryLeadStore::new());
        let registry = Arc::new(ImportRegistry::new());
        let job_id = staged_job(&store, 2).await;

        let handle = registry.spawn_commit(store.clone(), job_id, 2, CommitOptions::default());
        registry.shutdown(Duration::from_secs(5)).await;

        assert_matches!(handle.await.unwrap(), Err(ImportError::Cancelled(_)));
        assert_eq!(registry.running_count(), 0);

        // A job stopped by shutdown is picked up again by the next process.
        let next = Arc::new(ImportRegistry::new());
        let summary = next
            .spawn_commit(store.clone(), job_id, 2, CommitOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.imported_count, 2);
        assert_eq!(store.leads().len(), 2);
    }
}
