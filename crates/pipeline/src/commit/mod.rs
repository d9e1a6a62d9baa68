//! Committing an import: staging the job, then the batched worker that
//! turns staged rows into leads.

pub mod assignment;
pub mod submit;
pub mod worker;

pub use submit::{submit_import, SubmittedImport};
pub use worker::{run_commit, CommitOptions};
