//! Background tasks.
//!
//! Commit workers run outside the request that started them so a large
//! import outlives the HTTP timeout. Every task observes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) for graceful
//! shutdown.

pub mod imports;
