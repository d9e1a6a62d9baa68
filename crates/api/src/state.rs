use std::sync::Arc;

use leadimport_core::lead_store::LeadStore;

use crate::background::imports::ImportRegistry;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Lead and import persistence.
    pub store: Arc<dyn LeadStore>,
    pub config: Arc<ServerConfig>,
    /// Commit workers running in this process.
    pub imports: Arc<ImportRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn LeadStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            imports: Arc::new(ImportRegistry::new()),
        }
    }
}
