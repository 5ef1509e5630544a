//! Shared application state for the web server.

use plankweb_orchestrator::OrchestratorPool;
use plankweb_store::{IdentityStore, ResultAggregator, StatusTracker};
use std::sync::Arc;

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityStore>,
    pub tracker: Arc<dyn StatusTracker>,
    pub results: Arc<ResultAggregator>,
    /// Accepted jobs are handed to the orchestrator here.
    pub pool: OrchestratorPool,
}

impl AppState {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        tracker: Arc<dyn StatusTracker>,
        results: Arc<ResultAggregator>,
        pool: OrchestratorPool,
    ) -> Self {
        Self { identity, tracker, results, pool }
    }
}

pub type SharedState = Arc<AppState>;
