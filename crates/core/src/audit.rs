//! Lead history (audit trail) constants and change-set builders.
//!
//! History rows are append-only. The commit worker writes one entry per
//! created or updated lead.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::field::{FieldKey, NormalizedData};
use crate::types::{DbId, LeadId};

// ---------------------------------------------------------------------------
// Action constants
// ---------------------------------------------------------------------------

/// Known history actions written by the import pipeline.
pub mod history_actions {
    pub const LEAD_CREATED: &str = "lead_created";
    pub const LEAD_UPDATED: &str = "lead_updated";
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One append-only history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadHistoryEntry {
    pub lead_id: LeadId,
    pub action: String,
    pub import_job_id: Option<DbId>,
    pub changes: Value,
}

impl LeadHistoryEntry {
    /// Entry for a lead created by an import.
    pub fn created(lead_id: LeadId, job_id: DbId, fields: &NormalizedData) -> Self {
        Self {
            lead_id,
            action: history_actions::LEAD_CREATED.to_string(),
            import_job_id: Some(job_id),
            changes: created_changes(fields),
        }
    }

    /// Entry for a lead updated by an import.
    pub fn updated(lead_id: LeadId, job_id: DbId, before: &NormalizedData, after: &NormalizedData) -> Self {
        Self {
            lead_id,
            action: history_actions::LEAD_UPDATED.to_string(),
            import_job_id: Some(job_id),
            changes: updated_changes(before, after),
        }
    }
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

/// `{ "fields": { "email": "…", … } }` for a new lead.
pub fn created_changes(fields: &NormalizedData) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), Value::String(v.clone())))
        .collect();
    json!({ "fields": map })
}

/// `{ "fields": { "city": { "old": "Paris", "new": "Lyon" } } }` for every
/// field whose value actually changed. Missing values are `null`.
pub fn updated_changes(before: &NormalizedData, after: &NormalizedData) -> Value {
    let mut map = Map::new();
    for field in FieldKey::ALL {
        let old = before.get(&field);
        let Some(new) = after.get(&field) else {
            continue;
        };
        if old != Some(new) {
            map.insert(
                field.as_str().to_string(),
                json!({ "old": old, "new": new }),
            );
        }
    }
    json!({ "fields": map })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(FieldKey, &str)]) -> NormalizedData {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    #[test]
    fn created_lists_all_fields() {
        let changes = created_changes(&data(&[(FieldKey::Email, "a@b.com"), (FieldKey::City, "Paris")]));
        assert_eq!(changes["fields"]["email"], "a@b.com");
        assert_eq!(changes["fields"]["city"], "Paris");
    }

    #[test]
    fn updated_lists_only_changes() {
        let before = data(&[(FieldKey::Email, "a@b.com"), (FieldKey::City, "Paris")]);
        let after = data(&[(FieldKey::Email, "a@b.com"), (FieldKey::City, "Lyon"), (FieldKey::Company, "Acme")]);
        let changes = updated_changes(&before, &after);
        let fields = changes["fields"].as_object().unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["city"]["old"], "Paris");
        assert_eq!(fields["city"]["new"], "Lyon");
        assert!(fields["company"]["old"].is_null());
    }

    #[test]
    fn entry_constructors_set_action() {
        let id = uuid::Uuid::new_v4();
        let e = LeadHistoryEntry::created(id, 7, &NormalizedData::new());
        assert_eq!(e.action, history_actions::LEAD_CREATED);
        assert_eq!(e.import_job_id, Some(7));
        let e = LeadHistoryEntry::updated(id, 7, &NormalizedData::new(), &NormalizedData::new());
        assert_eq!(e.action, history_actions::LEAD_UPDATED);
    }
}
