//! Column auto-mapping.
//!
//! Each file header gets one best `(field, confidence)` candidate from the
//! alias table, fuzzy header similarity and a look at sample values.
//! Candidates are then assigned greedily in descending confidence so two
//! columns never claim the same field.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::FieldKey;
use crate::parser::ParsedRow;

/// Minimum confidence for an automatic assignment.
pub const DEFAULT_AUTO_MAP_THRESHOLD: f64 = 0.7;

/// Number of sample values kept per column for display.
pub const SAMPLE_VALUE_COUNT: usize = 3;

/// Confidence of a header that merely contains (or is contained in) an alias.
const CONTAINS_CONFIDENCE: f64 = 0.85;

/// Fuzzy similarity is scaled down so it never beats an exact alias.
const FUZZY_WEIGHT: f64 = 0.9;

const EMAIL_SAMPLE_CONFIDENCE: f64 = 0.75;
const PHONE_SAMPLE_CONFIDENCE: f64 = 0.72;

static SAMPLE_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

static SAMPLE_PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+()\d\s.\-]{8,20}$").expect("valid regex"));

/// Mapping of one file column to a lead field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source_column: String,
    pub source_index: usize,
    pub target_field: Option<FieldKey>,
    /// In `[0, 1]`. Manual overrides are always `1.0`.
    pub confidence: f64,
    pub is_manual: bool,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    column: usize,
    field: FieldKey,
    confidence: f64,
}

/// Build one mapping per header.
pub fn auto_map_columns(headers: &[String], sample_rows: &[ParsedRow], threshold: f64) -> Vec<ColumnMapping> {
    let mut mappings: Vec<ColumnMapping> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| ColumnMapping {
            source_column: header.clone(),
            source_index: index,
            target_field: None,
            confidence: 0.0,
            is_manual: false,
            sample_values: sample_values(sample_rows, index),
        })
        .collect();

    let mut candidates: Vec<Candidate> = mappings
        .iter()
        .filter_map(|m| {
            best_candidate(&m.source_column, &m.sample_values).map(|(field, confidence)| Candidate {
                column: m.source_index,
                field,
                confidence,
            })
        })
        .collect();

    // Stable: equal confidences keep column order.
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut claimed: HashSet<FieldKey> = HashSet::new();
    for candidate in candidates {
        if candidate.confidence < threshold || claimed.contains(&candidate.field) {
            continue;
        }
        claimed.insert(candidate.field);
        let mapping = &mut mappings[candidate.column];
        mapping.target_field = Some(candidate.field);
        mapping.confidence = candidate.confidence;
    }

    mappings
}

/// Apply a user override to column `source_index`.
///
/// Any other column holding the same field is released so the mapping stays
/// one-to-one.
pub fn set_manual_mapping(
    mappings: &mut [ColumnMapping],
    source_index: usize,
    target: Option<FieldKey>,
) -> Result<(), CoreError> {
    if !mappings.iter().any(|m| m.source_index == source_index) {
        return Err(CoreError::Validation(format!(
            "Column index {source_index} does not exist in this file"
        )));
    }

    for mapping in mappings.iter_mut() {
        if mapping.source_index == source_index {
            mapping.target_field = target;
            mapping.is_manual = true;
            mapping.confidence = 1.0;
        } else if target.is_some() && mapping.target_field == target {
            mapping.target_field = None;
            mapping.confidence = 0.0;
        }
    }
    Ok(())
}

/// Fields currently targeted by at least one column.
pub fn mapped_fields(mappings: &[ColumnMapping]) -> Vec<FieldKey> {
    mappings.iter().filter_map(|m| m.target_field).collect()
}

/// Whether any of email / phone / external_id is mapped.
pub fn has_contact_mapping(mappings: &[ColumnMapping]) -> bool {
    mappings
        .iter()
        .filter_map(|m| m.target_field)
        .any(FieldKey::is_contact_key)
}

/// Lowercase and turn `_ - .` separators into single spaces.
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace(['_', '-', '.', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best field for one header, if any scores above zero.
fn best_candidate(header: &str, samples: &[String]) -> Option<(FieldKey, f64)> {
    let normalized = normalize_header(header);
    let mut best: Option<(FieldKey, f64)> = None;

    for field in FieldKey::ALL {
        let score = header_score(&normalized, field);
        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((field, score));
        }
    }

    if let Some((field, score)) = sample_score(samples) {
        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((field, score));
        }
    }

    best
}

fn header_score(normalized: &str, field: FieldKey) -> f64 {
    if normalized.is_empty() {
        return 0.0;
    }

    let mut best = 0.0f64;
    for alias in field.aliases() {
        if normalized == *alias {
            return 1.0;
        }
        let contains = alias.len() >= 3
            && normalized.len() >= 3
            && (normalized.contains(alias) || alias.contains(normalized));
        let score = if contains {
            CONTAINS_CONFIDENCE
        } else {
            strsim::jaro_winkler(normalized, alias) * FUZZY_WEIGHT
        };
        best = best.max(score);
    }
    best
}

/// Infer email/phone from the data itself when the header is unhelpful.
fn sample_score(samples: &[String]) -> Option<(FieldKey, f64)> {
    if samples.is_empty() {
        return None;
    }
    let half = samples.len().div_ceil(2);

    let emails = samples.iter().filter(|s| SAMPLE_EMAIL_RE.is_match(s.trim())).count();
    if emails >= half {
        return Some((FieldKey::Email, EMAIL_SAMPLE_CONFIDENCE));
    }

    let phones = samples.iter().filter(|s| SAMPLE_PHONE_RE.is_match(s.trim())).count();
    if phones >= half {
        return Some((FieldKey::Phone, PHONE_SAMPLE_CONFIDENCE));
    }

    None
}

fn sample_values(rows: &[ParsedRow], index: usize) -> Vec<String> {
    rows.iter()
        .map(|r| r.value(index).trim())
        .filter(|v| !v.is_empty())
        .take(SAMPLE_VALUE_COUNT)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(n: i32, values: &[&str]) -> ParsedRow {
        ParsedRow {
            row_number: n,
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn exact_aliases_map_with_full_confidence() {
        let m = auto_map_columns(&headers(&["Email", "Phone", "Company"]), &[], DEFAULT_AUTO_MAP_THRESHOLD);
        assert_eq!(m[0].target_field, Some(FieldKey::Email));
        assert_eq!(m[0].confidence, 1.0);
        assert_eq!(m[1].target_field, Some(FieldKey::Phone));
        assert_eq!(m[2].target_field, Some(FieldKey::Company));
    }

    #[test]
    fn separators_are_ignored() {
        let m = auto_map_columns(&headers(&["first_name", "Last-Name", "postal.code"]), &[], 0.7);
        assert_eq!(m[0].target_field, Some(FieldKey::FirstName));
        assert_eq!(m[1].target_field, Some(FieldKey::LastName));
        assert_eq!(m[2].target_field, Some(FieldKey::PostalCode));
    }

    #[test]
    fn french_headers() {
        let m = auto_map_columns(&headers(&["Prénom", "Nom", "Téléphone", "Code postal"]), &[], 0.7);
        assert_eq!(m[0].target_field, Some(FieldKey::FirstName));
        assert_eq!(m[1].target_field, Some(FieldKey::LastName));
        assert_eq!(m[2].target_field, Some(FieldKey::Phone));
        assert_eq!(m[3].target_field, Some(FieldKey::PostalCode));
    }

    #[test]
    fn no_field_is_claimed_twice() {
        // Both headers are exact email aliases; the first column wins the tie.
        let m = auto_map_columns(&headers(&["Email", "Mail"]), &[], 0.7);
        assert_eq!(m[0].target_field, Some(FieldKey::Email));
        assert_eq!(m[1].target_field, None);
    }

    #[test]
    fn higher_confidence_wins_regardless_of_order() {
        // "Work email address" only contains an alias; "E-mail" is exact.
        let m = auto_map_columns(&headers(&["Work email address", "E-mail"]), &[], 0.7);
        assert_eq!(m[1].target_field, Some(FieldKey::Email));
        assert_eq!(m[0].target_field, None);
    }

    #[test]
    fn unknown_header_stays_unmapped() {
        let m = auto_map_columns(&headers(&["Favourite colour"]), &[], 0.7);
        assert_eq!(m[0].target_field, None);
    }

    #[test]
    fn samples_identify_email_column() {
        let rows = vec![
            row(1, &["jean@test.com", "x"]),
            row(2, &["marie@test.com", "y"]),
            row(3, &["", "z"]),
        ];
        let m = auto_map_columns(&headers(&["Col1", "Col2"]), &rows, 0.7);
        assert_eq!(m[0].target_field, Some(FieldKey::Email));
        assert_eq!(m[0].sample_values, vec!["jean@test.com", "marie@test.com"]);
    }

    #[test]
    fn samples_identify_phone_column() {
        let rows = vec![row(1, &["06 12 34 56 78"]), row(2, &["+33612345678"])];
        let m = auto_map_columns(&headers(&["Col1"]), &rows, 0.7);
        assert_eq!(m[0].target_field, Some(FieldKey::Phone));
    }

    #[test]
    fn mappings_keep_column_order() {
        let m = auto_map_columns(&headers(&["Notes", "Email", "Xyz"]), &[], 0.7);
        let indexes: Vec<usize> = m.iter().map(|m| m.source_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn manual_override_releases_previous_owner() {
        let mut m = auto_map_columns(&headers(&["Email", "Other"]), &[], 0.7);
        set_manual_mapping(&mut m, 1, Some(FieldKey::Email)).unwrap();

        assert_eq!(m[0].target_field, None);
        assert_eq!(m[1].target_field, Some(FieldKey::Email));
        assert!(m[1].is_manual);
        assert_eq!(m[1].confidence, 1.0);
    }

    #[test]
    fn manual_override_unknown_index_rejected() {
        let mut m = auto_map_columns(&headers(&["Email"]), &[], 0.7);
        assert!(set_manual_mapping(&mut m, 9, None).is_err());
    }

    #[test]
    fn contact_mapping_detection() {
        let m = auto_map_columns(&headers(&["Company", "City"]), &[], 0.7);
        assert!(!has_contact_mapping(&m));
        let m = auto_map_columns(&headers(&["Company", "External ID"]), &[], 0.7);
        assert!(has_contact_mapping(&m));
    }
}
