//! Duplicate detection within an uploaded file, plus the pure half of the
//! database duplicate check (result types and changed-field diffing).
//!
//! The async lookup against the lead store lives in the pipeline crate.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::field::{FieldKey, NormalizedData};
use crate::importer::UnifiedRowAction;
use crate::lead::ExistingLeadSnapshot;
use crate::normalize::match_key;
use crate::types::RowNumber;
use crate::validation::rules::RowValidationResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fields checked when the user does not choose any, in priority order.
pub const DEFAULT_CHECK_FIELDS: [FieldKey; 2] = [FieldKey::Email, FieldKey::Phone];

/// Maximum number of values sent in one store lookup.
pub const MAX_LOOKUP_BATCH: usize = 100;

// ---------------------------------------------------------------------------
// File duplicates
// ---------------------------------------------------------------------------

/// A row inside a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDuplicateRow {
    pub row_number: RowNumber,
    pub is_first_occurrence: bool,
    pub data: NormalizedData,
}

/// Rows sharing one normalized value of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDuplicateGroup {
    /// The occurrence key, `field:value`.
    pub id: String,
    pub matched_field: FieldKey,
    /// Lowercased and trimmed.
    pub matched_value: String,
    pub rows: Vec<FileDuplicateRow>,
    pub count: usize,
}

impl FileDuplicateGroup {
    pub fn first_row_number(&self) -> Option<RowNumber> {
        self.rows.iter().find(|r| r.is_first_occurrence).map(|r| r.row_number)
    }
}

/// Duplicate status of one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDuplicateFlag {
    pub row_number: RowNumber,
    /// Group the row belongs to, if any.
    pub group_id: Option<String>,
    pub is_first_occurrence: bool,
}

impl RowDuplicateFlag {
    /// A later occurrence that would be skipped by default.
    pub fn is_duplicate(&self) -> bool {
        self.group_id.is_some() && !self.is_first_occurrence
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDuplicateResult {
    /// One flag per input row, in input order.
    pub rows: Vec<RowDuplicateFlag>,
    pub duplicate_groups: Vec<FileDuplicateGroup>,
    /// Non-first occurrences only.
    pub duplicate_count: usize,
    pub group_count: usize,
}

impl FileDuplicateResult {
    /// Row numbers of every non-first occurrence.
    pub fn duplicate_row_numbers(&self) -> BTreeSet<RowNumber> {
        self.rows
            .iter()
            .filter(|r| r.is_duplicate())
            .map(|r| r.row_number)
            .collect()
    }

    /// The first occurrence a duplicate row repeats.
    pub fn original_of(&self, row_number: RowNumber) -> Option<RowNumber> {
        let flag = self.rows.iter().find(|r| r.row_number == row_number)?;
        if !flag.is_duplicate() {
            return None;
        }
        let group_id = flag.group_id.as_deref()?;
        self.duplicate_groups
            .iter()
            .find(|g| g.id == group_id)
            .and_then(FileDuplicateGroup::first_row_number)
    }
}

/// Group valid rows that share a normalized value.
///
/// Fields are processed in the order given; a row that already joined a
/// group for an earlier field is not considered again. Invalid rows are
/// ignored entirely.
pub fn detect_file_duplicates(rows: &[RowValidationResult], check_fields: &[FieldKey]) -> FileDuplicateResult {
    let mut valid: Vec<&RowValidationResult> = rows.iter().filter(|r| r.is_valid).collect();
    valid.sort_by_key(|r| r.row_number);

    let mut assigned: HashMap<RowNumber, String> = HashMap::new();
    let mut first_occurrences: BTreeSet<RowNumber> = BTreeSet::new();
    let mut groups = Vec::new();
    let mut seen_fields: Vec<FieldKey> = Vec::new();

    for &field in check_fields {
        if seen_fields.contains(&field) {
            continue;
        }
        seen_fields.push(field);

        let mut occurrences: IndexMap<String, Vec<&RowValidationResult>> = IndexMap::new();
        for row in &valid {
            if assigned.contains_key(&row.row_number) {
                continue;
            }
            let Some(value) = row.value(field) else {
                continue;
            };
            let normalized = match_key(value);
            if normalized.is_empty() {
                continue;
            }
            occurrences
                .entry(format!("{}:{normalized}", field.as_str()))
                .or_default()
                .push(row);
        }

        for (key, members) in occurrences {
            if members.len() < 2 {
                continue;
            }
            let matched_value = key[field.as_str().len() + 1..].to_string();
            let group_rows: Vec<FileDuplicateRow> = members
                .iter()
                .enumerate()
                .map(|(i, row)| FileDuplicateRow {
                    row_number: row.row_number,
                    is_first_occurrence: i == 0,
                    data: row.normalized_data.clone(),
                })
                .collect();

            for row in &members {
                assigned.insert(row.row_number, key.clone());
            }
            first_occurrences.insert(members[0].row_number);

            groups.push(FileDuplicateGroup {
                id: key,
                matched_field: field,
                matched_value,
                count: group_rows.len(),
                rows: group_rows,
            });
        }
    }

    let flags = rows
        .iter()
        .map(|r| RowDuplicateFlag {
            row_number: r.row_number,
            group_id: assigned.get(&r.row_number).cloned(),
            is_first_occurrence: first_occurrences.contains(&r.row_number),
        })
        .collect();

    let duplicate_count = groups.iter().map(|g| g.count - 1).sum();
    FileDuplicateResult {
        rows: flags,
        group_count: groups.len(),
        duplicate_groups: groups,
        duplicate_count,
    }
}

// ---------------------------------------------------------------------------
// Database duplicates
// ---------------------------------------------------------------------------

/// A file row that matches a lead already in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbDuplicateRow {
    pub row_number: RowNumber,
    pub matched_field: FieldKey,
    pub matched_value: String,
    pub existing_lead: ExistingLeadSnapshot,
    pub changed_fields: Vec<FieldKey>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub row_action: Option<UnifiedRowAction>,
}

impl DbDuplicateRow {
    /// Recompute `changed_fields` against (possibly edited) row data.
    pub fn with_row_data(&self, data: &NormalizedData) -> Self {
        Self {
            changed_fields: compute_changed_fields(data, &self.existing_lead.fields),
            ..self.clone()
        }
    }
}

/// Outcome of a database duplicate check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbDuplicateCheck {
    pub duplicates: Vec<DbDuplicateRow>,
    pub checked_rows: usize,
    /// Set when the lookup failed and the check degraded to "no duplicates".
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<String>,
}

impl DbDuplicateCheck {
    pub fn unavailable(checked_rows: usize, warning: impl Into<String>) -> Self {
        Self {
            duplicates: Vec::new(),
            checked_rows,
            warning: Some(warning.into()),
        }
    }

    pub fn row_numbers(&self) -> BTreeSet<RowNumber> {
        self.duplicates.iter().map(|d| d.row_number).collect()
    }
}

/// Comparable fields whose imported value differs from the stored one.
///
/// Comparison ignores case and whitespace runs. Fields the imported row
/// leaves empty are not reported.
pub fn compute_changed_fields(imported: &NormalizedData, existing: &NormalizedData) -> Vec<FieldKey> {
    FieldKey::COMPARABLE
        .into_iter()
        .filter(|field| {
            let Some(new_value) = imported.get(field).map(|v| compare_key(v)) else {
                return false;
            };
            if new_value.is_empty() {
                return false;
            }
            let old_value = existing.get(field).map(|v| compare_key(v)).unwrap_or_default();
            new_value != old_value
        })
        .collect()
}

fn compare_key(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::evaluator::validate_mapped;
    use std::collections::BTreeMap;

    fn row(n: RowNumber, pairs: &[(FieldKey, &str)]) -> RowValidationResult {
        let mapped: BTreeMap<FieldKey, String> = pairs.iter().map(|(f, v)| (*f, v.to_string())).collect();
        validate_mapped(n, &mapped)
    }

    fn data(pairs: &[(FieldKey, &str)]) -> NormalizedData {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    // -- file duplicates ----------------------------------------------------

    #[test]
    fn groups_repeated_email() {
        let rows = vec![
            row(1, &[(FieldKey::Email, "x@y.com")]),
            row(2, &[(FieldKey::Email, "z@y.com")]),
            row(3, &[(FieldKey::Email, "x@y.com")]),
        ];
        let result = detect_file_duplicates(&rows, &[FieldKey::Email]);

        assert_eq!(result.group_count, 1);
        assert_eq!(result.duplicate_count, 1);
        let group = &result.duplicate_groups[0];
        assert_eq!(group.id, "email:x@y.com");
        assert_eq!(group.count, 2);
        assert!(group.rows[0].is_first_occurrence);
        assert_eq!(group.rows[0].row_number, 1);
        assert!(!group.rows[1].is_first_occurrence);
        assert_eq!(group.rows[1].row_number, 3);
        assert_eq!(result.duplicate_row_numbers(), BTreeSet::from([3]));
        assert_eq!(result.original_of(3), Some(1));
    }

    #[test]
    fn matching_ignores_case() {
        let rows = vec![
            row(1, &[(FieldKey::Email, "Jean@Test.COM")]),
            row(2, &[(FieldKey::Email, "jean@test.com")]),
        ];
        let result = detect_file_duplicates(&rows, &[FieldKey::Email]);
        assert_eq!(result.group_count, 1);
        assert_eq!(result.duplicate_groups[0].matched_value, "jean@test.com");
    }

    #[test]
    fn invalid_rows_are_excluded() {
        let rows = vec![
            row(1, &[(FieldKey::Email, "x@y.com")]),
            row(2, &[(FieldKey::Email, "x@y.com"), (FieldKey::Phone, "12")]),
        ];
        assert!(!rows[1].is_valid);
        let result = detect_file_duplicates(&rows, &[FieldKey::Email]);
        assert_eq!(result.group_count, 0);
        assert_eq!(result.duplicate_count, 0);
        assert!(result.rows.iter().all(|f| f.group_id.is_none()));
    }

    #[test]
    fn first_field_wins() {
        // Rows 1 and 2 share email; 2 and 3 share phone. Row 2 stays in the
        // email group, leaving row 3 alone on phone.
        let rows = vec![
            row(1, &[(FieldKey::Email, "a@x.com"), (FieldKey::Phone, "0611111111")]),
            row(2, &[(FieldKey::Email, "a@x.com"), (FieldKey::Phone, "0622222222")]),
            row(3, &[(FieldKey::Email, "c@x.com"), (FieldKey::Phone, "0622222222")]),
        ];
        let result = detect_file_duplicates(&rows, &[FieldKey::Email, FieldKey::Phone]);
        assert_eq!(result.group_count, 1);
        assert_eq!(result.duplicate_groups[0].matched_field, FieldKey::Email);
        assert_eq!(result.rows[2].group_id, None);
    }

    #[test]
    fn second_field_groups_remaining_rows() {
        let rows = vec![
            row(1, &[(FieldKey::Email, "a@x.com"), (FieldKey::Phone, "0611111111")]),
            row(2, &[(FieldKey::Email, "b@x.com"), (FieldKey::Phone, "06 11 11 11 11")]),
            row(3, &[(FieldKey::Phone, "+33611111111")]),
        ];
        let result = detect_file_duplicates(&rows, &[FieldKey::Email, FieldKey::Phone]);
        assert_eq!(result.group_count, 1);
        let group = &result.duplicate_groups[0];
        assert_eq!(group.matched_field, FieldKey::Phone);
        assert_eq!(group.count, 3);
        assert_eq!(result.duplicate_count, 2);
        assert_eq!(group.rows.iter().filter(|r| r.is_first_occurrence).count(), 1);
    }

    #[test]
    fn unsorted_input_uses_lowest_row_as_first() {
        let rows = vec![
            row(5, &[(FieldKey::Email, "x@y.com")]),
            row(2, &[(FieldKey::Email, "x@y.com")]),
        ];
        let result = detect_file_duplicates(&rows, &[FieldKey::Email]);
        assert_eq!(result.duplicate_groups[0].first_row_number(), Some(2));
        assert_eq!(result.duplicate_row_numbers(), BTreeSet::from([5]));
    }

    #[test]
    fn no_check_fields_no_groups() {
        let rows = vec![row(1, &[(FieldKey::Email, "x@y.com")]), row(2, &[(FieldKey::Email, "x@y.com")])];
        let result = detect_file_duplicates(&rows, &[]);
        assert_eq!(result.group_count, 0);
        assert_eq!(result.duplicate_count, 0);
        assert_eq!(result.rows.len(), 2);
    }

    // -- changed fields -----------------------------------------------------

    #[test]
    fn changed_fields_ignore_case_and_spacing() {
        let imported = data(&[(FieldKey::Company, "ACME  Corp"), (FieldKey::City, "Lyon")]);
        let existing = data(&[(FieldKey::Company, "acme corp"), (FieldKey::City, "Paris")]);
        assert_eq!(compute_changed_fields(&imported, &existing), vec![FieldKey::City]);
    }

    #[test]
    fn changed_fields_skip_absent_imported_values() {
        let imported = data(&[(FieldKey::Email, "a@b.com")]);
        let existing = data(&[(FieldKey::Email, "a@b.com"), (FieldKey::Company, "Acme")]);
        assert!(compute_changed_fields(&imported, &existing).is_empty());
    }

    #[test]
    fn changed_fields_report_new_values() {
        let imported = data(&[(FieldKey::JobTitle, "CTO"), (FieldKey::Source, "fair")]);
        let existing = NormalizedData::new();
        // Source is not comparable.
        assert_eq!(compute_changed_fields(&imported, &existing), vec![FieldKey::JobTitle]);
    }
}
