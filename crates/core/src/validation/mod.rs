//! Row validation.
//!
//! Provides issue/result types, the pure row evaluator and the import preview
//! summary. None of it touches the database.

pub mod evaluator;
pub mod import_preview;
pub mod rules;
