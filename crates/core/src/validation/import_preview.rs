//! Import preview: validation and duplicate detection results combined
//! into the summary and issue lists the user reviews before committing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rules::RowValidationResult;
use crate::duplicate_detection::{DbDuplicateCheck, DbDuplicateRow, FileDuplicateResult};
use crate::importer::{DuplicateConfig, RowAction, UnifiedRowAction};
use crate::types::RowNumber;

/// Why a row needs the user's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Invalid,
    FileDuplicate,
    DbDuplicate,
}

impl IssueKind {
    /// Decision applied until the user chooses otherwise.
    pub fn default_action(self, config: &DuplicateConfig) -> UnifiedRowAction {
        match self {
            Self::Invalid | Self::FileDuplicate => UnifiedRowAction::Skip,
            Self::DbDuplicate => match config.strategy {
                RowAction::Skip => UnifiedRowAction::Skip,
                RowAction::Create => UnifiedRowAction::Import,
                RowAction::Update => UnifiedRowAction::Update,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub total: usize,
    /// Valid rows that are neither a later file duplicate nor a database duplicate.
    pub valid: usize,
    pub invalid: usize,
    pub file_duplicates: usize,
    pub db_duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportPreview {
    pub summary: PreviewSummary,
    pub validated_rows: Vec<RowValidationResult>,
    pub file_duplicates: FileDuplicateResult,
    pub db_duplicates: DbDuplicateCheck,
}

impl ImportPreview {
    pub fn new(
        validated_rows: Vec<RowValidationResult>,
        file_duplicates: FileDuplicateResult,
        db_duplicates: DbDuplicateCheck,
    ) -> Self {
        let total = validated_rows.len();
        let invalid = validated_rows.iter().filter(|r| !r.is_valid).count();
        let file_dup_count = file_duplicates.duplicate_count;
        let db_dup_count = db_duplicates.duplicates.len();

        Self {
            summary: PreviewSummary {
                total,
                valid: total.saturating_sub(invalid + file_dup_count + db_dup_count),
                invalid,
                file_duplicates: file_dup_count,
                db_duplicates: db_dup_count,
            },
            validated_rows,
            file_duplicates,
            db_duplicates,
        }
    }

    /// Warning left by a degraded database duplicate check.
    pub fn warning(&self) -> Option<&str> {
        self.db_duplicates.warning.as_deref()
    }

    pub fn row(&self, row_number: RowNumber) -> Option<&RowValidationResult> {
        self.validated_rows.iter().find(|r| r.row_number == row_number)
    }

    pub fn invalid_rows(&self) -> impl Iterator<Item = &RowValidationResult> {
        self.validated_rows.iter().filter(|r| !r.is_valid)
    }

    pub fn db_duplicate(&self, row_number: RowNumber) -> Option<&DbDuplicateRow> {
        self.db_duplicates.duplicates.iter().find(|d| d.row_number == row_number)
    }

    /// Issue of a single row; invalid wins over file duplicate, which wins
    /// over database duplicate.
    pub fn issue_kind(&self, row_number: RowNumber) -> Option<IssueKind> {
        let row = self.row(row_number)?;
        if !row.is_valid {
            return Some(IssueKind::Invalid);
        }
        if self.file_duplicates.original_of(row_number).is_some() {
            return Some(IssueKind::FileDuplicate);
        }
        if self.db_duplicate(row_number).is_some() {
            return Some(IssueKind::DbDuplicate);
        }
        None
    }

    /// Every row that needs a decision, with its issue.
    pub fn issue_rows(&self) -> BTreeMap<RowNumber, IssueKind> {
        self.validated_rows
            .iter()
            .filter_map(|r| self.issue_kind(r.row_number).map(|k| (r.row_number, k)))
            .collect()
    }

    pub fn default_decisions(&self, config: &DuplicateConfig) -> BTreeMap<RowNumber, UnifiedRowAction> {
        self.issue_rows()
            .into_iter()
            .map(|(n, kind)| (n, kind.default_action(config)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicate_detection::detect_file_duplicates;
    use crate::field::FieldKey;
    use crate::lead::ExistingLeadSnapshot;
    use crate::validation::evaluator::validate_mapped;

    fn row(n: RowNumber, pairs: &[(FieldKey, &str)]) -> RowValidationResult {
        let mapped = pairs.iter().map(|(f, v)| (*f, v.to_string())).collect();
        validate_mapped(n, &mapped)
    }

    fn scenario_rows() -> Vec<RowValidationResult> {
        vec![
            row(1, &[(FieldKey::Email, "jean@test.com"), (FieldKey::FirstName, "Jean")]),
            row(2, &[(FieldKey::FirstName, "Marie"), (FieldKey::Company, "Acme")]),
            row(3, &[(FieldKey::Email, "Jean@Test.COM")]),
        ]
    }

    #[test]
    fn three_row_scenario_summary() {
        let rows = scenario_rows();
        let file = detect_file_duplicates(&rows, &[FieldKey::Email, FieldKey::Phone]);
        let preview = ImportPreview::new(rows, file, DbDuplicateCheck::default());

        assert_eq!(
            preview.summary,
            PreviewSummary {
                total: 3,
                valid: 1,
                invalid: 1,
                file_duplicates: 1,
                db_duplicates: 0,
            }
        );

        let decisions = preview.default_decisions(&DuplicateConfig::default());
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[&2], UnifiedRowAction::Skip);
        assert_eq!(decisions[&3], UnifiedRowAction::Skip);
        assert_eq!(preview.issue_kind(2), Some(IssueKind::Invalid));
        assert_eq!(preview.issue_kind(3), Some(IssueKind::FileDuplicate));
        assert_eq!(preview.issue_kind(1), None);
    }

    #[test]
    fn db_duplicates_reduce_valid_count_and_follow_strategy() {
        let rows = vec![row(1, &[(FieldKey::Email, "a@x.com")]), row(2, &[(FieldKey::Email, "b@x.com")])];
        let now = chrono::Utc::now();
        let dup = DbDuplicateRow {
            row_number: 2,
            matched_field: FieldKey::Email,
            matched_value: "b@x.com".into(),
            existing_lead: ExistingLeadSnapshot {
                id: uuid::Uuid::new_v4(),
                fields: Default::default(),
                created_at: now,
                updated_at: now,
            },
            changed_fields: vec![],
            row_action: None,
        };
        let check = DbDuplicateCheck {
            duplicates: vec![dup],
            checked_rows: 2,
            warning: None,
        };
        let preview = ImportPreview::new(rows, FileDuplicateResult::default(), check);

        assert_eq!(preview.summary.valid, 1);
        assert_eq!(preview.summary.db_duplicates, 1);

        let config = DuplicateConfig {
            strategy: RowAction::Update,
            ..DuplicateConfig::default()
        };
        assert_eq!(preview.default_decisions(&config)[&2], UnifiedRowAction::Update);
    }

    #[test]
    fn degraded_check_surfaces_warning() {
        let rows = vec![row(1, &[(FieldKey::Email, "a@x.com")])];
        let preview = ImportPreview::new(
            rows,
            FileDuplicateResult::default(),
            DbDuplicateCheck::unavailable(1, "Duplicate check unavailable"),
        );
        assert_eq!(preview.warning(), Some("Duplicate check unavailable"));
        assert_eq!(preview.summary.valid, 1);
    }
}
