//! Row structs for the import tables.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and the conversion into the matching core record.

pub mod import_job;
pub mod import_row;
pub mod lead;
pub mod lead_history;
pub mod user;
