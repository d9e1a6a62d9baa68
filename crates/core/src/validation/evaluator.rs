//! Row evaluator: mapping, normalization and validation of one row. No database access.

use std::collections::BTreeMap;

use super::rules::{
    digit_count, RowValidationResult, ValidationIssue, EMAIL_RE, MAX_PHONE_DIGITS, MIN_PHONE_DIGITS,
    MSG_EMAIL_FIXED, MSG_INVALID_EMAIL, MSG_MISSING_COMPANY, MSG_MISSING_CONTACT, MSG_MISSING_NAME,
    MSG_PHONE_TOO_LONG, MSG_PHONE_TOO_SHORT,
};
use crate::field::{FieldKey, NormalizedData};
use crate::mapping::ColumnMapping;
use crate::normalize::normalize_field;
use crate::parser::ParsedRow;
use crate::types::RowNumber;

/// Per-row field overrides entered by the user. `None` clears the field.
pub type RowEdits = BTreeMap<FieldKey, Option<String>>;

/// Pick the trimmed, non-empty raw value of every mapped column.
pub fn apply_mapping(row: &ParsedRow, mappings: &[ColumnMapping]) -> BTreeMap<FieldKey, String> {
    let mut mapped = BTreeMap::new();
    for mapping in mappings {
        let Some(field) = mapping.target_field else {
            continue;
        };
        let Some(raw) = row.values.get(mapping.source_index) else {
            continue;
        };
        let raw = raw.trim();
        if !raw.is_empty() {
            mapped.insert(field, raw.to_string());
        }
    }
    mapped
}

/// Map, normalize and check one parsed row.
pub fn validate_row(row: &ParsedRow, mappings: &[ColumnMapping]) -> RowValidationResult {
    validate_mapped(row.row_number, &apply_mapping(row, mappings))
}

/// Validate every row, preserving order.
pub fn validate_rows(rows: &[ParsedRow], mappings: &[ColumnMapping]) -> Vec<RowValidationResult> {
    rows.iter().map(|row| validate_row(row, mappings)).collect()
}

/// Normalize and check already-mapped values.
///
/// Also used to re-validate rows at commit time after user edits have been
/// merged in. Normalizers are idempotent, so passing normalized data back in
/// is safe.
pub fn validate_mapped(row_number: RowNumber, mapped: &BTreeMap<FieldKey, String>) -> RowValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut data = NormalizedData::new();

    for (&field, raw) in mapped {
        let normalized = normalize_field(field, raw);
        if normalized.was_fixed {
            warnings.push(ValidationIssue::new(field, MSG_EMAIL_FIXED, Some(raw)));
        }
        if let Some(value) = normalized.value {
            data.insert(field, value);
        }
    }

    for (&field, value) in &data {
        let max = field.max_length();
        if value.chars().count() > max {
            errors.push(ValidationIssue::new(
                field,
                format!("{} must be at most {max} characters", field.label()),
                Some(value),
            ));
        }
    }

    if let Some(email) = data.get(&FieldKey::Email) {
        if !EMAIL_RE.is_match(email) {
            errors.push(ValidationIssue::new(FieldKey::Email, MSG_INVALID_EMAIL, Some(email)));
        }
    }

    if let Some(phone) = data.get(&FieldKey::Phone) {
        let digits = digit_count(phone);
        if digits < MIN_PHONE_DIGITS {
            errors.push(ValidationIssue::new(FieldKey::Phone, MSG_PHONE_TOO_SHORT, Some(phone)));
        } else if digits > MAX_PHONE_DIGITS {
            warnings.push(ValidationIssue::new(FieldKey::Phone, MSG_PHONE_TOO_LONG, Some(phone)));
        }
    }

    // Missing contact info is reported on `email` as the representative field.
    if !data.contains_key(&FieldKey::Email) && !data.contains_key(&FieldKey::Phone) {
        errors.push(ValidationIssue::new(FieldKey::Email, MSG_MISSING_CONTACT, None));
    }

    if !data.contains_key(&FieldKey::FirstName) && !data.contains_key(&FieldKey::LastName) {
        warnings.push(ValidationIssue::new(FieldKey::FirstName, MSG_MISSING_NAME, None));
    }
    if !data.contains_key(&FieldKey::Company) {
        warnings.push(ValidationIssue::new(FieldKey::Company, MSG_MISSING_COMPANY, None));
    }

    RowValidationResult::new(row_number, errors, warnings, data)
}

/// Overlay user edits on top of normalized data, producing a new map.
pub fn merge_edits(normalized: &NormalizedData, edits: &RowEdits) -> NormalizedData {
    let mut merged = normalized.clone();
    for (&field, value) in edits {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => {
                merged.insert(field, v.to_string());
            }
            _ => {
                merged.remove(&field);
            }
        }
    }
    merged
}

/// Re-validate a result with edits applied. The original is left untouched.
pub fn revalidate_with_edits(result: &RowValidationResult, edits: &RowEdits) -> RowValidationResult {
    if edits.is_empty() {
        return result.clone();
    }
    validate_mapped(result.row_number, &merge_edits(&result.normalized_data, edits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::auto_map_columns;

    fn mapped(pairs: &[(FieldKey, &str)]) -> BTreeMap<FieldKey, String> {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    fn has_error(result: &RowValidationResult, field: FieldKey) -> bool {
        result.errors.iter().any(|e| e.field == field)
    }

    // -- contact rule --

    #[test]
    fn row_without_contact_is_invalid() {
        let r = validate_mapped(
            1,
            &mapped(&[
                (FieldKey::FirstName, "Jean"),
                (FieldKey::Company, "Acme"),
                (FieldKey::City, "Paris"),
                (FieldKey::ExternalId, "X-1"),
            ]),
        );
        assert!(!r.is_valid);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].field, FieldKey::Email);
        assert_eq!(r.errors[0].message, MSG_MISSING_CONTACT);
    }

    #[test]
    fn whitespace_only_contact_counts_as_missing() {
        let r = validate_mapped(1, &mapped(&[(FieldKey::Email, "   "), (FieldKey::Phone, "\t")]));
        assert!(!r.is_valid);
        assert!(r.normalized_data.is_empty());
    }

    #[test]
    fn phone_only_is_valid() {
        let r = validate_mapped(1, &mapped(&[(FieldKey::Phone, "06 12 34 56 78")]));
        assert!(r.is_valid);
        assert_eq!(r.value(FieldKey::Phone), Some("+33612345678"));
    }

    // -- format checks --

    #[test]
    fn invalid_email_is_error() {
        let r = validate_mapped(1, &mapped(&[(FieldKey::Email, "not-an-email")]));
        assert!(!r.is_valid);
        assert!(has_error(&r, FieldKey::Email));
        assert_eq!(r.errors[0].value.as_deref(), Some("not-an-email"));
    }

    #[test]
    fn short_phone_is_error_long_phone_is_warning() {
        let r = validate_mapped(1, &mapped(&[(FieldKey::Phone, "12345")]));
        assert!(has_error(&r, FieldKey::Phone));

        let r = validate_mapped(1, &mapped(&[(FieldKey::Phone, "+1234567890123456")]));
        assert!(r.is_valid);
        assert!(r.warnings.iter().any(|w| w.message == MSG_PHONE_TOO_LONG));
    }

    #[test]
    fn max_length_enforced() {
        let long = "a".repeat(21);
        let r = validate_mapped(
            1,
            &mapped(&[(FieldKey::Email, "a@b.com"), (FieldKey::PostalCode, &long)]),
        );
        assert!(!r.is_valid);
        assert!(has_error(&r, FieldKey::PostalCode));
    }

    #[test]
    fn fixed_email_produces_warning_not_error() {
        let r = validate_mapped(1, &mapped(&[(FieldKey::Email, "jean@gmailcom")]));
        assert!(r.is_valid);
        assert_eq!(r.value(FieldKey::Email), Some("jean@gmail.com"));
        assert!(r.warnings.iter().any(|w| w.message == MSG_EMAIL_FIXED));
    }

    #[test]
    fn missing_name_and_company_are_warnings() {
        let r = validate_mapped(1, &mapped(&[(FieldKey::Email, "a@b.com")]));
        assert!(r.is_valid);
        let messages: Vec<&str> = r.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.contains(&MSG_MISSING_NAME));
        assert!(messages.contains(&MSG_MISSING_COMPANY));
    }

    // -- mapping --

    #[test]
    fn validate_row_applies_mapping() {
        let headers = vec!["Email".to_string(), "Nom".to_string(), "Favourite colour".to_string()];
        let mappings = auto_map_columns(&headers, &[], 0.7);
        let row = ParsedRow {
            row_number: 4,
            values: vec![" Jean@Test.COM ".into(), "dupont".into(), "zzz".into()],
        };
        let r = validate_row(&row, &mappings);
        assert_eq!(r.row_number, 4);
        assert_eq!(r.value(FieldKey::Email), Some("jean@test.com"));
        assert_eq!(r.value(FieldKey::LastName), Some("Dupont"));
        assert_eq!(r.normalized_data.len(), 2);
    }

    #[test]
    fn short_row_ignores_missing_columns() {
        let headers = vec!["Email".to_string(), "Phone".to_string()];
        let mappings = auto_map_columns(&headers, &[], 0.7);
        let row = ParsedRow {
            row_number: 1,
            values: vec!["a@b.com".into()],
        };
        let r = validate_row(&row, &mappings);
        assert!(r.is_valid);
        assert_eq!(r.value(FieldKey::Phone), None);
    }

    // -- edits --

    #[test]
    fn edits_overlay_without_mutating_original() {
        let original = validate_mapped(1, &mapped(&[(FieldKey::Email, "bad")]));
        assert!(!original.is_valid);

        let mut edits = RowEdits::new();
        edits.insert(FieldKey::Email, Some("Good@Example.com".into()));
        let fixed = revalidate_with_edits(&original, &edits);

        assert!(fixed.is_valid);
        assert_eq!(fixed.value(FieldKey::Email), Some("good@example.com"));
        assert_eq!(original.value(FieldKey::Email), Some("bad"));
    }

    #[test]
    fn edit_to_none_clears_field() {
        let original = validate_mapped(
            1,
            &mapped(&[(FieldKey::Email, "a@b.com"), (FieldKey::Phone, "0612345678")]),
        );
        let mut edits = RowEdits::new();
        edits.insert(FieldKey::Email, None);
        let merged = merge_edits(&original.normalized_data, &edits);
        assert!(!merged.contains_key(&FieldKey::Email));
        assert_eq!(merged.get(&FieldKey::Phone).map(String::as_str), Some("+33612345678"));
    }
}
