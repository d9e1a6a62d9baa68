//! The import wizard behind its async transitions.
//!
//! [`ImportWizard`] owns a [`WizardState`] and runs the slow steps (building
//! the preview, committing) around it. The state lock is never held across
//! an await. While an async transition runs the state is marked busy and a
//! second attempt returns `Ok(false)` without doing anything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use leadimport_core::duplicate_detection::MAX_LOOKUP_BATCH;
use leadimport_core::error::CoreError;
use leadimport_core::import_wizard::{WizardAction, WizardState};
use leadimport_core::importer::{CommitRequest, ImportResultsSummary};
use leadimport_core::lead_store::LeadStore;
use leadimport_core::mapping::{auto_map_columns, DEFAULT_AUTO_MAP_THRESHOLD};
use leadimport_core::parser::{parse_upload, ParseOptions};
use leadimport_core::progress::ImportProgress;
use tokio_util::sync::CancellationToken;

use crate::commit::{run_commit, submit_import, CommitOptions};
use crate::error::ImportError;
use crate::preview::build_preview;
use crate::progress::ProgressSink;

#[derive(Debug, Clone)]
pub struct WizardSettings {
    pub parse: ParseOptions,
    pub auto_map_threshold: f64,
    pub lookup_batch_size: usize,
    pub commit: CommitOptions,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            auto_map_threshold: DEFAULT_AUTO_MAP_THRESHOLD,
            lookup_batch_size: MAX_LOOKUP_BATCH,
            commit: CommitOptions::default(),
        }
    }
}

pub struct ImportWizard {
    store: Arc<dyn LeadStore>,
    settings: WizardSettings,
    state: Mutex<WizardState>,
}

impl ImportWizard {
    pub fn new(store: Arc<dyn LeadStore>, settings: WizardSettings) -> Self {
        Self {
            store,
            settings,
            state: Mutex::new(WizardState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WizardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current state.
    pub fn state(&self) -> WizardState {
        self.lock().clone()
    }

    pub fn dispatch(&self, action: WizardAction) -> Result<(), CoreError> {
        self.lock().dispatch(action)
    }

    /// Parse an uploaded file and propose column mappings.
    pub fn load_file(&self, file_name: &str, bytes: &[u8]) -> Result<(), ImportError> {
        let file = parse_upload(file_name, bytes, &self.settings.parse)?;
        let mappings = auto_map_columns(&file.headers, &file.rows, self.settings.auto_map_threshold);
        tracing::info!(
            file_name,
            rows = file.total_rows(),
            columns = file.headers.len(),
            "Import file loaded",
        );
        self.dispatch(WizardAction::FileLoaded { file, mappings })?;
        Ok(())
    }

    /// Validate every row and look for duplicates, then move to preview.
    ///
    /// A failing database lookup only leaves a warning on the preview.
    pub async fn advance_to_preview(&self) -> Result<bool, ImportError> {
        let (file, mappings, config) = {
            let mut state = self.lock();
            if state.is_processing {
                return Ok(false);
            }
            state.dispatch(WizardAction::BeginPreview)?;
            match state.parsed_file.clone() {
                Some(file) => (file, state.mappings.clone(), state.duplicate_config.clone()),
                None => {
                    let message = "Upload a file first".to_string();
                    state.dispatch(WizardAction::OperationFailed(message.clone()))?;
                    return Err(CoreError::Validation(message).into());
                }
            }
        };

        let preview = build_preview(
            self.store.as_ref(),
            &file.rows,
            &mappings,
            &config,
            self.settings.lookup_batch_size,
        )
        .await;

        self.dispatch(WizardAction::PreviewReady(preview))?;
        Ok(true)
    }

    /// Submit the reviewed rows and run the commit to the end.
    pub async fn start_import(&self, cancel: CancellationToken) -> Result<bool, ImportError> {
        let request = {
            let mut state = self.lock();
            if state.is_processing {
                return Ok(false);
            }
            state.dispatch(WizardAction::BeginImport)?;
            match state.build_commit_request() {
                Ok(request) => request,
                Err(e) => {
                    state.dispatch(WizardAction::OperationFailed(e.to_string()))?;
                    return Err(e.into());
                }
            }
        };

        let result = self.commit(request, cancel).await;
        match result {
            Ok(summary) => {
                self.dispatch(WizardAction::ImportFinished(summary))?;
                Ok(true)
            }
            Err(e) => {
                self.dispatch(WizardAction::OperationFailed(e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        request: CommitRequest,
        cancel: CancellationToken,
    ) -> Result<ImportResultsSummary, ImportError> {
        let submitted = submit_import(self.store.as_ref(), request).await?;
        self.dispatch(WizardAction::ImportStarted {
            job_id: submitted.job.id,
        })?;

        let sink = |progress: &ImportProgress| {
            // Progress only lands while the import step is showing.
            let _ = self.lock().dispatch(WizardAction::ProgressUpdated(progress.clone()));
        };
        run_commit(
            self.store.as_ref(),
            submitted.job.id,
            self.settings.commit,
            &sink as &dyn ProgressSink,
            &cancel,
        )
        .await
    }
}
