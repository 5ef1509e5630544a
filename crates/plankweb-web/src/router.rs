//! Axum router: maps all URL paths to handlers.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    jobs::{job_overview, lookup_id, submit_job},
    results::chain_result,
    status::{health, task_status},
};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health", get(health))

        // Intake
        .route("/api/jobs",          post(submit_job))
        .route("/api/id",            get(lookup_id))

        // Status and results
        .route("/api/jobs/{job_id}",                    get(job_overview))
        .route("/api/status/{task}/{job_id}",           get(task_status))
        .route("/api/results/{task}/{job_id}/{chain}",  get(chain_result))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
