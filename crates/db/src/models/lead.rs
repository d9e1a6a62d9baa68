//! Models for the `leads` table.

use leadimport_core::field::{FieldKey, NormalizedData};
use leadimport_core::lead::ExistingLeadSnapshot;
use leadimport_core::types::{DbId, LeadId, Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `leads` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Lead {
    pub id: LeadId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub status: String,
    pub assigned_to: Option<UserId>,
    pub import_job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Lead {
    pub fn value(&self, field: FieldKey) -> Option<&str> {
        let value = match field {
            FieldKey::FirstName => &self.first_name,
            FieldKey::LastName => &self.last_name,
            FieldKey::Email => &self.email,
            FieldKey::Phone => &self.phone,
            FieldKey::Company => &self.company,
            FieldKey::JobTitle => &self.job_title,
            FieldKey::Address => &self.address,
            FieldKey::City => &self.city,
            FieldKey::PostalCode => &self.postal_code,
            FieldKey::Country => &self.country,
            FieldKey::Website => &self.website,
            FieldKey::Notes => &self.notes,
            FieldKey::Source => &self.source,
            FieldKey::ExternalId => &self.external_id,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Non-empty field values.
    pub fn fields(&self) -> NormalizedData {
        FieldKey::ALL
            .into_iter()
            .filter_map(|f| self.value(f).map(|v| (f, v.to_string())))
            .collect()
    }

    pub fn snapshot(&self) -> ExistingLeadSnapshot {
        ExistingLeadSnapshot {
            id: self.id,
            fields: self.fields(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_columns_are_left_out_of_fields() {
        let now = chrono::Utc::now();
        let lead = Lead {
            id: uuid::Uuid::new_v4(),
            first_name: Some("Jean".into()),
            last_name: Some(String::new()),
            email: Some("jean@test.com".into()),
            phone: None,
            company: None,
            job_title: None,
            address: None,
            city: None,
            postal_code: None,
            country: None,
            website: None,
            notes: None,
            source: Some("import".into()),
            external_id: None,
            status: "new".into(),
            assigned_to: None,
            import_job_id: Some(4),
            created_at: now,
            updated_at: now,
        };

        let snapshot = lead.snapshot();
        assert_eq!(snapshot.fields.len(), 3);
        assert_eq!(snapshot.value(FieldKey::Email), Some("jean@test.com"));
        assert_eq!(snapshot.value(FieldKey::LastName), None);
    }
}
