//! Lead import domain logic: parsing, column mapping, normalization,
//! validation, duplicate detection, commit planning and the wizard state
//! machine. No database access and no async runtime; the only async item is
//! the [`lead_store::LeadStore`] trait that other crates implement.

pub mod audit;
pub mod duplicate_detection;
pub mod error;
pub mod field;
pub mod import_status;
pub mod import_wizard;
pub mod importer;
pub mod lead;
pub mod lead_store;
pub mod mapping;
pub mod normalize;
pub mod parser;
pub mod progress;
pub mod report;
pub mod types;
pub mod validation;
