//! Validation issue and result types, plus the fixed schema constraints.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::field::{FieldKey, NormalizedData};
use crate::types::RowNumber;

/// RFC-lite email shape check.
pub static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Fewer digits than this is an error.
pub const MIN_PHONE_DIGITS: usize = 8;

/// More digits than this is only a warning (extensions, odd formats).
pub const MAX_PHONE_DIGITS: usize = 15;

pub const MSG_MISSING_CONTACT: &str = "At least one contact field (email or phone) is required";
pub const MSG_INVALID_EMAIL: &str = "Invalid email format";
pub const MSG_PHONE_TOO_SHORT: &str = "Phone number is too short";
pub const MSG_PHONE_TOO_LONG: &str = "Phone number is unusually long";
pub const MSG_EMAIL_FIXED: &str = "Email domain was corrected automatically";
pub const MSG_MISSING_NAME: &str = "No first or last name";
pub const MSG_MISSING_COMPANY: &str = "No company";

/// Whether an issue blocks the row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
}

/// A single field-level problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: FieldKey,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
}

impl ValidationIssue {
    pub fn new(field: FieldKey, message: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            field,
            message: message.into(),
            value: value.map(str::to_string),
        }
    }
}

/// Validation outcome for one row. Never mutated after creation; edits are
/// applied by building a new result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowValidationResult {
    pub row_number: RowNumber,
    /// Always `errors.is_empty()`.
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub normalized_data: NormalizedData,
}

impl RowValidationResult {
    pub fn new(
        row_number: RowNumber,
        errors: Vec<ValidationIssue>,
        warnings: Vec<ValidationIssue>,
        normalized_data: NormalizedData,
    ) -> Self {
        Self {
            row_number,
            is_valid: errors.is_empty(),
            errors,
            warnings,
            normalized_data,
        }
    }

    pub fn value(&self, field: FieldKey) -> Option<&str> {
        self.normalized_data.get(&field).map(String::as_str)
    }

    /// First error message, used as the row's "reason" in reports.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

/// Count of ASCII digits in a value.
pub fn digit_count(value: &str) -> usize {
    value.chars().filter(|c| c.is_ascii_digit()).count()
}
