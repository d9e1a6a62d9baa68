//! Commit request contract and the pure planning step that turns an
//! untrusted request into a [`CommitPlan`].
//!
//! Planning re-validates every row with the user's edits merged in,
//! recomputes file duplicates, decides each row's initial status and drops
//! any per-row action or duplicate reference that does not point at a known
//! valid row. Every pending row leaves planning with its resolved action, so
//! the staged rows alone are enough to resume a commit. No database access.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::duplicate_detection::{detect_file_duplicates, DEFAULT_CHECK_FIELDS};
use crate::error::CoreError;
use crate::field::{FieldKey, NormalizedData};
use crate::import_status::RowStatus;
use crate::lead::{validate_lead_status, DEFAULT_LEAD_SOURCE, LEAD_STATUS_NEW};
use crate::mapping::ColumnMapping;
use crate::parser::FileType;
use crate::types::{LeadId, RowNumber, UserId};
use crate::validation::evaluator::{merge_edits, validate_mapped, RowEdits};
use crate::validation::rules::RowValidationResult;

// ── Row actions ──────────────────────────────────────────────────────

/// The user's decision for a row surfaced in the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedRowAction {
    Skip,
    Import,
    Update,
}

impl UnifiedRowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Import => "import",
            Self::Update => "update",
        }
    }

    /// The commit-side action this decision translates to.
    pub fn to_row_action(self) -> RowAction {
        match self {
            Self::Skip => RowAction::Skip,
            Self::Import => RowAction::Create,
            Self::Update => RowAction::Update,
        }
    }
}

/// What the commit worker does with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Skip,
    Create,
    Update,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Create => "create",
            Self::Update => "update",
        }
    }

    /// Parse an untrusted action string. Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skip" => Some(Self::Skip),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// How newly created leads are assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AssignmentConfig {
    #[default]
    None,
    RoundRobin { user_ids: Vec<UserId> },
    /// Look up the raw value of `column` among assignable users' names.
    ByColumn { column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// Fields checked for duplicates, in priority order.
    #[serde(default = "default_check_fields")]
    pub check_fields: Vec<FieldKey>,
    /// Applied to database duplicates the user made no decision for.
    #[serde(default = "default_strategy")]
    pub strategy: RowAction,
    #[serde(default = "default_true")]
    pub check_database: bool,
}

fn default_check_fields() -> Vec<FieldKey> {
    DEFAULT_CHECK_FIELDS.to_vec()
}

fn default_strategy() -> RowAction {
    RowAction::Skip
}

fn default_true() -> bool {
    true
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            check_fields: default_check_fields(),
            strategy: default_strategy(),
            check_database: true,
        }
    }
}

// ── Request ──────────────────────────────────────────────────────────

/// A validated row as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRow {
    #[serde(flatten)]
    pub validation: RowValidationResult,
    /// Raw cell values keyed by source column header.
    #[serde(default)]
    pub raw_data: BTreeMap<String, String>,
}

/// Reference from a row to the existing lead it duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbDuplicateInfo {
    pub row_number: RowNumber,
    pub matched_field: FieldKey,
    pub matched_value: String,
    /// Kept as text so malformed ids can be dropped instead of failing the request.
    pub existing_lead_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub file_name: String,
    pub file_type: FileType,
    pub total_rows: usize,
    pub validated_rows: Vec<CommitRow>,
    #[serde(default)]
    pub mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub assignment_config: AssignmentConfig,
    #[serde(default)]
    pub duplicate_config: DuplicateConfig,
    /// `[row_number, action]` pairs.
    #[serde(default)]
    pub row_actions: Vec<(RowNumber, String)>,
    #[serde(default)]
    pub db_duplicate_info: Vec<DbDuplicateInfo>,
    #[serde(default)]
    pub edited_rows: BTreeMap<RowNumber, RowEdits>,
    #[serde(default)]
    pub default_status: Option<String>,
    #[serde(default)]
    pub default_source: Option<String>,
}

// ── Plan ─────────────────────────────────────────────────────────────

/// A row ready to be persisted with its initial status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedRow {
    pub row_number: RowNumber,
    pub raw_data: BTreeMap<String, String>,
    pub normalized_data: NormalizedData,
    pub status: RowStatus,
    /// Settlement reason, or for a pending default skip the message it will carry.
    pub message: Option<String>,
    /// What the worker does with a `valid` row; `None` once settled.
    pub action: Option<RowAction>,
    /// The lead an `update` overwrites.
    pub existing_lead_id: Option<LeadId>,
}

/// The existing lead a row will update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbMatch {
    pub matched_field: FieldKey,
    pub matched_value: String,
    pub existing_lead_id: LeadId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub file_name: String,
    pub file_type: FileType,
    pub total_rows: usize,
    /// Ascending by row number, one entry per distinct row.
    pub rows: Vec<PlannedRow>,
    pub row_actions: BTreeMap<RowNumber, RowAction>,
    pub db_duplicates: BTreeMap<RowNumber, DbMatch>,
    pub mappings: Vec<ColumnMapping>,
    pub assignment: AssignmentConfig,
    pub duplicate_config: DuplicateConfig,
    pub default_status: String,
    pub default_source: String,
    /// Number of actions and duplicate references dropped as unusable.
    pub dropped_entries: usize,
}

impl CommitPlan {
    pub fn count_with_status(&self, status: RowStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }
}

/// Final counters of a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResultsSummary {
    pub total_rows: i64,
    pub imported_count: i64,
    pub updated_count: i64,
    pub skipped_count: i64,
    pub error_count: i64,
}

/// Turn a client request into a plan.
///
/// Fails only on job-level problems (no rows, unknown default status);
/// row-level problems are folded into row statuses.
pub fn build_commit_plan(request: CommitRequest) -> Result<CommitPlan, CoreError> {
    if request.validated_rows.is_empty() {
        return Err(CoreError::Validation("Import contains no rows".into()));
    }

    let default_status = match request.default_status.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => {
            validate_lead_status(s)?;
            s.to_string()
        }
        _ => LEAD_STATUS_NEW.to_string(),
    };
    let default_source = request
        .default_source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_LEAD_SOURCE)
        .to_string();

    if let AssignmentConfig::RoundRobin { user_ids } = &request.assignment_config {
        if user_ids.is_empty() {
            return Err(CoreError::Validation(
                "Round-robin assignment needs at least one user".into(),
            ));
        }
    }

    // Re-validate with edits, keeping the first entry for any repeated row number.
    let mut seen = BTreeSet::new();
    let mut rows: Vec<(RowValidationResult, BTreeMap<String, String>)> = Vec::new();
    for row in request.validated_rows {
        let number = row.validation.row_number;
        if !seen.insert(number) {
            continue;
        }
        // Client-side validity is not trusted; normalizers are idempotent.
        let edits = request.edited_rows.get(&number).cloned().unwrap_or_default();
        let revalidated = validate_mapped(number, &merge_edits(&row.validation.normalized_data, &edits));
        rows.push((revalidated, row.raw_data));
    }
    rows.sort_by_key(|(r, _)| r.row_number);

    let validations: Vec<RowValidationResult> = rows.iter().map(|(r, _)| r.clone()).collect();
    let file_duplicates = detect_file_duplicates(&validations, &request.duplicate_config.check_fields);
    let valid_rows: BTreeSet<RowNumber> = validations.iter().filter(|r| r.is_valid).map(|r| r.row_number).collect();

    let mut dropped_entries = 0usize;

    // Raw requested actions, last entry winning; invalid rows are resolved below.
    let mut requested: BTreeMap<RowNumber, RowAction> = BTreeMap::new();
    for (number, action) in &request.row_actions {
        match RowAction::parse(action) {
            Some(action) if seen.contains(number) => {
                requested.insert(*number, action);
            }
            _ => dropped_entries += 1,
        }
    }

    let mut db_duplicates = BTreeMap::new();
    for info in request.db_duplicate_info {
        let Ok(existing_lead_id) = uuid::Uuid::parse_str(info.existing_lead_id.trim()) else {
            dropped_entries += 1;
            continue;
        };
        if !valid_rows.contains(&info.row_number) {
            dropped_entries += 1;
            continue;
        }
        db_duplicates.insert(
            info.row_number,
            DbMatch {
                matched_field: info.matched_field,
                matched_value: info.matched_value,
                existing_lead_id,
            },
        );
    }

    let mut row_actions = BTreeMap::new();
    let mut planned = Vec::with_capacity(rows.len());
    for (validation, raw_data) in rows {
        let number = validation.row_number;
        let requested_action = requested.get(&number).copied();
        // An explicit action overrides the file duplicate skip.
        let file_original = match requested_action {
            None => file_duplicates.original_of(number),
            Some(_) => None,
        };

        let mut pending = None;
        let (status, message) = if !validation.is_valid {
            // Nothing may import an invalid row; its action is dropped.
            if requested_action.is_some() {
                dropped_entries += 1;
            }
            let reason = validation.first_error().unwrap_or("Invalid row").to_string();
            (RowStatus::Skipped, Some(reason))
        } else if let Some(original) = file_original {
            (RowStatus::Skipped, Some(format!("Duplicate of row {original} in file")))
        } else {
            if let Some(action) = requested_action {
                row_actions.insert(number, action);
            }
            let resolved = resolve_pending(
                requested_action,
                db_duplicates.get(&number),
                request.duplicate_config.strategy,
            );
            let message = resolved.message.clone();
            pending = Some(resolved);
            (RowStatus::Valid, message)
        };

        planned.push(PlannedRow {
            row_number: number,
            raw_data,
            normalized_data: validation.normalized_data,
            status,
            message,
            action: pending.as_ref().map(|p| p.action),
            existing_lead_id: pending.and_then(|p| p.existing_lead_id),
        });
    }

    Ok(CommitPlan {
        file_name: request.file_name,
        file_type: request.file_type,
        total_rows: request.total_rows,
        rows: planned,
        row_actions,
        db_duplicates,
        mappings: request.mappings,
        assignment: request.assignment_config,
        duplicate_config: request.duplicate_config,
        default_status,
        default_source,
        dropped_entries,
    })
}

/// The resolved decision for a row the worker still has to process.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingAction {
    action: RowAction,
    existing_lead_id: Option<LeadId>,
    message: Option<String>,
}

/// An explicit action wins; a database duplicate without one follows the
/// strategy; everything else is created. An update with no known lead
/// becomes a create.
fn resolve_pending(explicit: Option<RowAction>, db_match: Option<&DbMatch>, strategy: RowAction) -> PendingAction {
    let action = explicit.or(db_match.map(|_| strategy)).unwrap_or(RowAction::Create);
    match (action, db_match) {
        (RowAction::Skip, Some(m)) if explicit.is_none() => PendingAction {
            action: RowAction::Skip,
            existing_lead_id: None,
            message: Some(format!("Duplicate of existing lead (matched on {})", m.matched_field.label())),
        },
        (RowAction::Skip, _) => PendingAction {
            action: RowAction::Skip,
            existing_lead_id: None,
            message: None,
        },
        (RowAction::Update, Some(m)) => PendingAction {
            action: RowAction::Update,
            existing_lead_id: Some(m.existing_lead_id),
            message: None,
        },
        (RowAction::Update, None) | (RowAction::Create, _) => PendingAction {
            action: RowAction::Create,
            existing_lead_id: None,
            message: None,
        },
    }
}
