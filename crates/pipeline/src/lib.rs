//! Async stages of a lead import.
//!
//! - [`duplicate_check`]: database duplicate lookup with graceful degradation
//! - [`preview`]: validation plus both duplicate checks
//! - [`commit`]: job submission and the batched commit worker
//! - [`progress`]: progress sinks fed by the worker
//! - [`wizard_session`]: the wizard state behind async transitions
//! - [`memory_store`]: an in-memory [`LeadStore`](leadimport_core::lead_store::LeadStore)

pub mod commit;
pub mod duplicate_check;
pub mod error;
pub mod memory_store;
pub mod preview;
pub mod progress;
pub mod wizard_session;

pub use error::ImportError;
