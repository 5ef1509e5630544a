use axum::{
    extract::{Path, Query, State},
    Json,
};
use plankweb_common::result_doc::ResultDocument;

use crate::error::ApiError;
use crate::handlers::{path_component, task_key, VariantQuery};
use crate::state::SharedState;

/// GET /api/results/{task}/{job_id}/{chain} - Per-chain result document
pub async fn chain_result(
    State(state): State<SharedState>,
    Path((task, job_id, chain)): Path<(String, String, String)>,
    Query(query): Query<VariantQuery>,
) -> Result<Json<ResultDocument>, ApiError> {
    let (job_id, key) = task_key(&task, &job_id, query)?;
    let chain = path_component(chain, "chain")?;
    state
        .results
        .load(&job_id, &key, &chain)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no {} result for chain {} of {}", key, chain, job_id)))
}
