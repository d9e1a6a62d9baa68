//! Lead import wizard state machine.
//!
//! Three steps: upload → preview → import. All mutation goes through
//! [`WizardState::dispatch`]; asynchronous work (validation with the
//! database duplicate check, the commit itself) is driven from outside by
//! dispatching a `Begin*` action, doing the work, then dispatching the
//! result. While such an operation runs the state is busy and every other
//! `Begin*` is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::duplicate_detection::DbDuplicateRow;
use crate::error::CoreError;
use crate::field::FieldKey;
use crate::importer::{
    AssignmentConfig, CommitRequest, CommitRow, DbDuplicateInfo, DuplicateConfig, ImportResultsSummary,
    UnifiedRowAction,
};
use crate::lead::{validate_lead_status, LEAD_STATUS_NEW};
use crate::mapping::{has_contact_mapping, mapped_fields, set_manual_mapping, ColumnMapping};
use crate::parser::ParsedFile;
use crate::progress::ImportProgress;
use crate::types::{DbId, RowNumber};
use crate::validation::evaluator::{merge_edits, RowEdits};
use crate::validation::import_preview::{ImportPreview, IssueKind};

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Upload,
    Preview,
    Import,
}

pub const MIN_STEP: u8 = 1;
pub const MAX_STEP: u8 = 3;

impl WizardStep {
    pub fn from_number(n: u8) -> Result<Self, CoreError> {
        match n {
            1 => Ok(Self::Upload),
            2 => Ok(Self::Preview),
            3 => Ok(Self::Import),
            _ => Err(CoreError::Validation(format!(
                "Invalid step number {n}. Must be between {MIN_STEP} and {MAX_STEP}"
            ))),
        }
    }

    pub fn to_number(self) -> u8 {
        match self {
            Self::Upload => 1,
            Self::Preview => 2,
            Self::Import => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::Preview => "Preview",
            Self::Import => "Import",
        }
    }
}

/// A transition must move exactly one step forward or backward.
pub fn validate_step_transition(current: u8, next: u8) -> Result<(), CoreError> {
    for (name, step) in [("Current", current), ("Next", next)] {
        if !(MIN_STEP..=MAX_STEP).contains(&step) {
            return Err(CoreError::Validation(format!(
                "{name} step {step} is out of range ({MIN_STEP}..{MAX_STEP})"
            )));
        }
    }

    let diff = (next as i16) - (current as i16);
    if diff != 1 && diff != -1 {
        return Err(CoreError::Validation(format!(
            "Cannot transition from step {current} to step {next}. \
             Must advance or go back exactly one step."
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum WizardAction {
    FileLoaded {
        file: ParsedFile,
        mappings: Vec<ColumnMapping>,
    },
    SetMapping {
        source_index: usize,
        target: Option<FieldKey>,
    },
    SetAssignment(AssignmentConfig),
    SetDuplicateConfig(DuplicateConfig),
    SetDefaultStatus(String),
    /// Start validation and duplicate detection (upload → preview).
    BeginPreview,
    PreviewReady(ImportPreview),
    SetRowDecision {
        row_number: RowNumber,
        action: UnifiedRowAction,
    },
    /// Apply one decision to every row with the given issue.
    SetDecisionForIssue {
        issue: IssueKind,
        action: UnifiedRowAction,
    },
    StartEditing(RowNumber),
    CancelEditing,
    SaveRowEdits {
        row_number: RowNumber,
        edits: RowEdits,
    },
    /// Start the commit (preview → import).
    BeginImport,
    ImportStarted {
        job_id: DbId,
    },
    ProgressUpdated(ImportProgress),
    ImportFinished(ImportResultsSummary),
    /// The running operation failed; the step is kept so the user can retry.
    OperationFailed(String),
    DismissWarning,
    ClearError,
    GoBack,
    /// Start over, keeping assignment, duplicate and default status settings.
    Reset,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WizardState {
    pub step: WizardStep,
    pub parsed_file: Option<ParsedFile>,
    pub mappings: Vec<ColumnMapping>,
    pub preview: Option<ImportPreview>,
    pub row_decisions: BTreeMap<RowNumber, UnifiedRowAction>,
    default_decisions: BTreeMap<RowNumber, UnifiedRowAction>,
    /// Overlay merged over normalized data only when the commit request is built.
    pub edited_rows: BTreeMap<RowNumber, RowEdits>,
    pub assignment: AssignmentConfig,
    pub duplicate_config: DuplicateConfig,
    pub default_status: String,
    pub progress: Option<ImportProgress>,
    pub results: Option<ImportResultsSummary>,
    pub job_id: Option<DbId>,
    pub is_processing: bool,
    pub editing_row: Option<RowNumber>,
    pub duplicate_warning: Option<String>,
    pub error: Option<String>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            step: WizardStep::Upload,
            parsed_file: None,
            mappings: Vec::new(),
            preview: None,
            row_decisions: BTreeMap::new(),
            default_decisions: BTreeMap::new(),
            edited_rows: BTreeMap::new(),
            assignment: AssignmentConfig::default(),
            duplicate_config: DuplicateConfig::default(),
            default_status: LEAD_STATUS_NEW.to_string(),
            progress: None,
            results: None,
            job_id: None,
            is_processing: false,
            editing_row: None,
            duplicate_warning: None,
            error: None,
        }
    }
}

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single mutation entry point.
    pub fn dispatch(&mut self, action: WizardAction) -> Result<(), CoreError> {
        match action {
            WizardAction::FileLoaded { file, mappings } => {
                self.require_idle()?;
                self.require_step(WizardStep::Upload)?;
                self.parsed_file = Some(file);
                self.mappings = mappings;
                self.clear_review();
                self.error = None;
            }
            WizardAction::SetMapping { source_index, target } => {
                self.require_idle()?;
                self.require_step(WizardStep::Upload)?;
                set_manual_mapping(&mut self.mappings, source_index, target)?;
            }
            WizardAction::SetAssignment(config) => {
                self.require_idle()?;
                self.assignment = config;
            }
            WizardAction::SetDuplicateConfig(config) => {
                self.require_idle()?;
                self.duplicate_config = config;
            }
            WizardAction::SetDefaultStatus(status) => {
                self.require_idle()?;
                validate_lead_status(&status)?;
                self.default_status = status;
            }
            WizardAction::BeginPreview => {
                self.require_idle()?;
                self.require_step(WizardStep::Upload)?;
                self.can_leave_upload()?;
                self.is_processing = true;
                self.error = None;
            }
            WizardAction::PreviewReady(preview) => {
                self.require_busy()?;
                self.require_step(WizardStep::Upload)?;
                self.transition(WizardStep::Preview)?;
                self.default_decisions = preview.default_decisions(&self.duplicate_config);
                self.row_decisions = self.default_decisions.clone();
                self.edited_rows.clear();
                self.editing_row = None;
                self.duplicate_warning = preview.warning().map(str::to_string);
                self.preview = Some(preview);
                self.is_processing = false;
            }
            WizardAction::SetRowDecision { row_number, action } => {
                self.require_idle()?;
                self.require_step(WizardStep::Preview)?;
                let issue = self.issue_of(row_number)?;
                check_action_for_issue(issue, action)?;
                self.row_decisions.insert(row_number, action);
            }
            WizardAction::SetDecisionForIssue { issue, action } => {
                self.require_idle()?;
                self.require_step(WizardStep::Preview)?;
                check_action_for_issue(issue, action)?;
                let rows: Vec<RowNumber> = self
                    .preview
                    .as_ref()
                    .map(|p| {
                        p.issue_rows()
                            .into_iter()
                            .filter(|(_, kind)| *kind == issue)
                            .map(|(n, _)| n)
                            .collect()
                    })
                    .unwrap_or_default();
                for n in rows {
                    self.row_decisions.insert(n, action);
                }
            }
            WizardAction::StartEditing(row_number) => {
                self.require_step(WizardStep::Preview)?;
                self.require_row(row_number)?;
                self.editing_row = Some(row_number);
            }
            WizardAction::CancelEditing => {
                self.editing_row = None;
            }
            WizardAction::SaveRowEdits { row_number, edits } => {
                self.require_idle()?;
                self.require_step(WizardStep::Preview)?;
                self.require_row(row_number)?;
                if edits.is_empty() {
                    self.edited_rows.remove(&row_number);
                } else {
                    self.edited_rows.insert(row_number, edits);
                }
                self.editing_row = None;
            }
            WizardAction::BeginImport => {
                self.require_idle()?;
                self.require_step(WizardStep::Preview)?;
                self.can_leave_preview()?;
                self.transition(WizardStep::Import)?;
                self.is_processing = true;
                self.editing_row = None;
                self.progress = None;
                self.results = None;
                self.job_id = None;
                self.error = None;
            }
            WizardAction::ImportStarted { job_id } => {
                self.require_step(WizardStep::Import)?;
                self.job_id = Some(job_id);
            }
            WizardAction::ProgressUpdated(progress) => {
                self.require_step(WizardStep::Import)?;
                self.progress = Some(progress);
            }
            WizardAction::ImportFinished(results) => {
                self.require_busy()?;
                self.require_step(WizardStep::Import)?;
                self.results = Some(results);
                self.is_processing = false;
            }
            WizardAction::OperationFailed(message) => {
                self.is_processing = false;
                self.error = Some(message);
            }
            WizardAction::DismissWarning => {
                self.duplicate_warning = None;
            }
            WizardAction::ClearError => {
                self.error = None;
            }
            WizardAction::GoBack => {
                self.require_idle()?;
                match self.step {
                    WizardStep::Upload => {
                        return Err(CoreError::Validation("Already at the first step".into()));
                    }
                    WizardStep::Preview => {
                        self.transition(WizardStep::Upload)?;
                        self.clear_review();
                    }
                    WizardStep::Import => {
                        if self.results.is_some() {
                            return Err(CoreError::Conflict(
                                "Import already finished; start a new import instead".into(),
                            ));
                        }
                        self.transition(WizardStep::Preview)?;
                        self.progress = None;
                        self.job_id = None;
                    }
                }
                self.error = None;
            }
            WizardAction::Reset => {
                self.require_idle()?;
                let assignment = std::mem::take(&mut self.assignment);
                let duplicate_config = std::mem::take(&mut self.duplicate_config);
                let default_status = std::mem::take(&mut self.default_status);
                *self = Self {
                    assignment,
                    duplicate_config,
                    default_status,
                    ..Self::default()
                };
            }
        }
        Ok(())
    }

    // -- guards --

    /// A parsed file with at least one mapped column, one of them a contact field.
    pub fn can_leave_upload(&self) -> Result<(), CoreError> {
        if self.parsed_file.is_none() {
            return Err(CoreError::Validation("Upload a file first".into()));
        }
        if mapped_fields(&self.mappings).is_empty() {
            return Err(CoreError::Validation("Map at least one column".into()));
        }
        if !has_contact_mapping(&self.mappings) {
            return Err(CoreError::Validation(
                "Map at least one of email, phone or external id".into(),
            ));
        }
        Ok(())
    }

    /// Something to import: a clean valid row or a decision the user changed.
    pub fn can_leave_preview(&self) -> Result<(), CoreError> {
        let valid = self.preview.as_ref().map_or(0, |p| p.summary.valid);
        if valid > 0 || self.has_non_default_decision() {
            Ok(())
        } else {
            Err(CoreError::Validation("Nothing to import".into()))
        }
    }

    pub fn has_non_default_decision(&self) -> bool {
        self.row_decisions
            .iter()
            .any(|(n, action)| self.default_decisions.get(n) != Some(action))
    }

    // -- derived views --

    pub fn decision(&self, row_number: RowNumber) -> Option<UnifiedRowAction> {
        self.row_decisions.get(&row_number).copied()
    }

    /// A database duplicate with edits applied and the current decision attached.
    pub fn db_duplicate_view(&self, row_number: RowNumber) -> Option<DbDuplicateRow> {
        let preview = self.preview.as_ref()?;
        let dup = preview.db_duplicate(row_number)?;
        let row = preview.row(row_number)?;
        let mut view = match self.edited_rows.get(&row_number) {
            Some(edits) => dup.with_row_data(&merge_edits(&row.normalized_data, edits)),
            None => dup.clone(),
        };
        view.row_action = self.decision(row_number);
        Some(view)
    }

    /// Assemble the commit request from the reviewed state.
    pub fn build_commit_request(&self) -> Result<CommitRequest, CoreError> {
        let file = self
            .parsed_file
            .as_ref()
            .ok_or_else(|| CoreError::Validation("No file loaded".into()))?;
        let preview = self
            .preview
            .as_ref()
            .ok_or_else(|| CoreError::Validation("Preview has not been computed".into()))?;

        let validated_rows = preview
            .validated_rows
            .iter()
            .map(|validation| {
                let raw_data = file
                    .rows
                    .iter()
                    .find(|r| r.row_number == validation.row_number)
                    .map(|r| {
                        file.headers
                            .iter()
                            .enumerate()
                            .map(|(i, h)| (h.clone(), r.value(i).to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                CommitRow {
                    validation: validation.clone(),
                    raw_data,
                }
            })
            .collect();

        let db_duplicate_info = preview
            .db_duplicates
            .duplicates
            .iter()
            .map(|d| DbDuplicateInfo {
                row_number: d.row_number,
                matched_field: d.matched_field,
                matched_value: d.matched_value.clone(),
                existing_lead_id: d.existing_lead.id.to_string(),
            })
            .collect();

        Ok(CommitRequest {
            file_name: file.file_name.clone(),
            file_type: file.file_type,
            total_rows: file.total_rows(),
            validated_rows,
            mappings: self.mappings.clone(),
            assignment_config: self.assignment.clone(),
            duplicate_config: self.duplicate_config.clone(),
            row_actions: self
                .row_decisions
                .iter()
                .filter(|(n, action)| self.default_decisions.get(*n) != Some(*action))
                .map(|(n, a)| (*n, a.to_row_action().as_str().to_string()))
                .collect(),
            db_duplicate_info,
            edited_rows: self.edited_rows.clone(),
            default_status: Some(self.default_status.clone()),
            default_source: None,
        })
    }

    // -- helpers --

    fn transition(&mut self, next: WizardStep) -> Result<(), CoreError> {
        validate_step_transition(self.step.to_number(), next.to_number())?;
        self.step = next;
        Ok(())
    }

    fn clear_review(&mut self) {
        self.preview = None;
        self.row_decisions.clear();
        self.default_decisions.clear();
        self.edited_rows.clear();
        self.editing_row = None;
        self.duplicate_warning = None;
    }

    fn require_idle(&self) -> Result<(), CoreError> {
        if self.is_processing {
            return Err(CoreError::Conflict("Another operation is in progress".into()));
        }
        Ok(())
    }

    fn require_busy(&self) -> Result<(), CoreError> {
        if !self.is_processing {
            return Err(CoreError::Conflict("No operation is in progress".into()));
        }
        Ok(())
    }

    fn require_step(&self, step: WizardStep) -> Result<(), CoreError> {
        if self.step != step {
            return Err(CoreError::Validation(format!(
                "Action not allowed at step '{}' (expected '{}')",
                self.step.label(),
                step.label()
            )));
        }
        Ok(())
    }

    fn require_row(&self, row_number: RowNumber) -> Result<(), CoreError> {
        let known = self.preview.as_ref().is_some_and(|p| p.row(row_number).is_some());
        if !known {
            return Err(CoreError::Validation(format!("Unknown row {row_number}")));
        }
        Ok(())
    }

    fn issue_of(&self, row_number: RowNumber) -> Result<IssueKind, CoreError> {
        self.preview
            .as_ref()
            .and_then(|p| p.issue_kind(row_number))
            .ok_or_else(|| CoreError::Validation(format!("Row {row_number} has no issue to decide")))
    }
}

/// `update` needs an existing lead to update.
fn check_action_for_issue(issue: IssueKind, action: UnifiedRowAction) -> Result<(), CoreError> {
    if action == UnifiedRowAction::Update && issue != IssueKind::DbDuplicate {
        return Err(CoreError::Validation(
            "Only rows matching an existing lead can be updated".into(),
        ));
    }
    Ok(())
}
