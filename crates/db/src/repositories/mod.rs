//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod import_job_repo;
pub mod import_row_repo;
pub mod lead_history_repo;
pub mod lead_repo;
pub mod user_repo;

pub use import_job_repo::ImportJobRepo;
pub use import_row_repo::ImportRowRepo;
pub use lead_history_repo::LeadHistoryRepo;
pub use lead_repo::LeadRepo;
pub use user_repo::UserRepo;
