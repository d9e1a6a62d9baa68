//! Progress sinks the commit worker reports into.

use leadimport_core::progress::ImportProgress;
use tokio::sync::watch;

/// Receives a snapshot after every batch and on each phase change.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &ImportProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&ImportProgress) + Send + Sync,
{
    fn report(&self, progress: &ImportProgress) {
        self(progress)
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: &ImportProgress) {}
}

/// Publishes the latest snapshot on a `watch` channel for pollers.
#[derive(Debug)]
pub struct WatchProgress {
    tx: watch::Sender<ImportProgress>,
}

impl WatchProgress {
    pub fn new(initial: ImportProgress) -> (Self, watch::Receiver<ImportProgress>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgress {
    fn report(&self, progress: &ImportProgress) {
        // `send_replace` keeps the value even when every receiver is gone.
        self.tx.send_replace(progress.clone());
    }
}
