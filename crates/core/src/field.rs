//! The closed set of lead fields an import can target.
//!
//! Every per-field behaviour (normalization kind, maximum length, header
//! aliases, database column) is an exhaustive `match` on [`FieldKey`], so a
//! new field cannot silently skip normalization or validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A lead field that a file column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    FirstName,
    LastName,
    Email,
    Phone,
    Company,
    JobTitle,
    Address,
    City,
    PostalCode,
    Country,
    Website,
    Notes,
    Source,
    ExternalId,
}

/// Field values keyed by field. A missing key means "no value".
pub type NormalizedData = BTreeMap<FieldKey, String>;

/// How a raw value is canonicalised before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerKind {
    Email,
    Phone,
    PostalCode,
    Name,
    Text,
}

impl FieldKey {
    /// All fields, in declaration order.
    pub const ALL: [FieldKey; 14] = [
        FieldKey::FirstName,
        FieldKey::LastName,
        FieldKey::Email,
        FieldKey::Phone,
        FieldKey::Company,
        FieldKey::JobTitle,
        FieldKey::Address,
        FieldKey::City,
        FieldKey::PostalCode,
        FieldKey::Country,
        FieldKey::Website,
        FieldKey::Notes,
        FieldKey::Source,
        FieldKey::ExternalId,
    ];

    /// Fields compared against an existing lead when computing a diff.
    pub const COMPARABLE: [FieldKey; 13] = [
        FieldKey::FirstName,
        FieldKey::LastName,
        FieldKey::Email,
        FieldKey::Phone,
        FieldKey::Company,
        FieldKey::JobTitle,
        FieldKey::Address,
        FieldKey::City,
        FieldKey::PostalCode,
        FieldKey::Country,
        FieldKey::Website,
        FieldKey::Notes,
        FieldKey::ExternalId,
    ];

    /// Stable string form, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Company => "company",
            Self::JobTitle => "job_title",
            Self::Address => "address",
            Self::City => "city",
            Self::PostalCode => "postal_code",
            Self::Country => "country",
            Self::Website => "website",
            Self::Notes => "notes",
            Self::Source => "source",
            Self::ExternalId => "external_id",
        }
    }

    /// Parse the string form. Used when filtering untrusted commit input.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown lead field '{s}'")))
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::FirstName => "First name",
            Self::LastName => "Last name",
            Self::Email => "Email",
            Self::Phone => "Phone",
            Self::Company => "Company",
            Self::JobTitle => "Job title",
            Self::Address => "Address",
            Self::City => "City",
            Self::PostalCode => "Postal code",
            Self::Country => "Country",
            Self::Website => "Website",
            Self::Notes => "Notes",
            Self::Source => "Source",
            Self::ExternalId => "External ID",
        }
    }

    /// Column name in the `leads` table.
    pub fn column(self) -> &'static str {
        // Column names match the string form one-to-one.
        self.as_str()
    }

    pub fn normalizer(self) -> NormalizerKind {
        match self {
            Self::Email => NormalizerKind::Email,
            Self::Phone => NormalizerKind::Phone,
            Self::PostalCode => NormalizerKind::PostalCode,
            Self::FirstName | Self::LastName => NormalizerKind::Name,
            Self::Company
            | Self::JobTitle
            | Self::Address
            | Self::City
            | Self::Country
            | Self::Website
            | Self::Notes
            | Self::Source
            | Self::ExternalId => NormalizerKind::Text,
        }
    }

    /// Maximum accepted length in characters.
    pub fn max_length(self) -> usize {
        match self {
            Self::FirstName | Self::LastName => 100,
            Self::Email => 255,
            Self::Phone => 50,
            Self::Company => 200,
            Self::JobTitle => 150,
            Self::Address => 500,
            Self::City | Self::Country | Self::Source => 100,
            Self::PostalCode => 20,
            Self::Website => 500,
            Self::Notes => 5000,
            Self::ExternalId => 255,
        }
    }

    /// Known header spellings (already lowercased, separators as spaces).
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::FirstName => &["first name", "firstname", "given name", "prenom", "prénom"],
            Self::LastName => &["last name", "lastname", "surname", "family name", "nom", "nom de famille"],
            Self::Email => &["email", "e mail", "email address", "mail", "courriel", "adresse email"],
            Self::Phone => &[
                "phone",
                "phone number",
                "telephone",
                "téléphone",
                "tel",
                "mobile",
                "portable",
                "cell",
            ],
            Self::Company => &["company", "company name", "organization", "organisation", "societe", "société", "entreprise"],
            Self::JobTitle => &["job title", "title", "position", "poste", "fonction"],
            Self::Address => &["address", "street", "street address", "adresse", "rue"],
            Self::City => &["city", "town", "ville", "commune"],
            Self::PostalCode => &["postal code", "postcode", "zip", "zip code", "code postal", "cp"],
            Self::Country => &["country", "pays"],
            Self::Website => &["website", "web site", "url", "site", "site web"],
            Self::Notes => &["notes", "note", "comment", "comments", "commentaire", "remarques"],
            Self::Source => &["source", "lead source", "origine", "origin"],
            Self::ExternalId => &["external id", "id", "reference", "ref", "crm id", "identifiant"],
        }
    }

    /// Whether this field identifies a person well enough to import on its own.
    pub fn is_contact_key(self) -> bool {
        matches!(self, Self::Email | Self::Phone | Self::ExternalId)
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
