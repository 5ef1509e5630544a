use axum::{
    extract::{Path, Query, State},
    Json,
};
use plankweb_common::StatusRecord;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::handlers::{task_key, VariantQuery};
use crate::state::SharedState;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/status/{task}/{job_id} - Single status record
pub async fn task_status(
    State(state): State<SharedState>,
    Path((task, job_id)): Path<(String, String)>,
    Query(query): Query<VariantQuery>,
) -> Result<Json<StatusRecord>, ApiError> {
    let (job_id, key) = task_key(&task, &job_id, query)?;
    state
        .tracker
        .read(&job_id, &key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{} has no status for {}", job_id, key)))
}
