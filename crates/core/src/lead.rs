//! Lead records as the import pipeline sees them.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::{FieldKey, NormalizedData};
use crate::types::{DbId, LeadId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Lead status
// ---------------------------------------------------------------------------

pub const LEAD_STATUS_NEW: &str = "new";
pub const LEAD_STATUS_CONTACTED: &str = "contacted";
pub const LEAD_STATUS_QUALIFIED: &str = "qualified";
pub const LEAD_STATUS_UNQUALIFIED: &str = "unqualified";
pub const LEAD_STATUS_CONVERTED: &str = "converted";
pub const LEAD_STATUS_LOST: &str = "lost";

pub const VALID_LEAD_STATUSES: &[&str] = &[
    LEAD_STATUS_NEW,
    LEAD_STATUS_CONTACTED,
    LEAD_STATUS_QUALIFIED,
    LEAD_STATUS_UNQUALIFIED,
    LEAD_STATUS_CONVERTED,
    LEAD_STATUS_LOST,
];

/// Source recorded on created leads when the request names none.
pub const DEFAULT_LEAD_SOURCE: &str = "import";

/// Validate the status given to newly created leads.
pub fn validate_lead_status(status: &str) -> Result<(), CoreError> {
    if VALID_LEAD_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid lead status '{status}'. Must be one of: {}",
            VALID_LEAD_STATUSES.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Point-in-time copy of a persisted lead's comparable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingLeadSnapshot {
    pub id: LeadId,
    pub fields: NormalizedData,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ExistingLeadSnapshot {
    pub fn value(&self, field: FieldKey) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// `First Last`, falling back to whichever part exists.
    pub fn display_name(&self) -> Option<String> {
        display_name(&self.fields)
    }
}

/// A lead about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub fields: NormalizedData,
    pub status: String,
    pub assigned_to: Option<UserId>,
    pub import_job_id: DbId,
}

/// Field values to overwrite on an existing lead. Fields absent from the map
/// keep their stored value; assignment and status are never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadUpdate {
    pub fields: NormalizedData,
    pub import_job_id: DbId,
}

/// A user leads can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignableUser {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
}

/// Human-readable name built from first/last name fields.
pub fn display_name(fields: &NormalizedData) -> Option<String> {
    let first = fields.get(&FieldKey::FirstName).map(String::as_str);
    let last = fields.get(&FieldKey::LastName).map(String::as_str);
    match (first, last) {
        (Some(f), Some(l)) => Some(format!("{f} {l}")),
        (Some(n), None) | (None, Some(n)) => Some(n.to_string()),
        (None, None) => None,
    }
}
