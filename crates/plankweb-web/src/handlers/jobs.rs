//! Intake: submit a job, look up an id, list a job's tasks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use plankweb_common::{Fingerprint, InputMethod, JobId, JobPayload};
use plankweb_store::TaskOverview;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::intake::{validate, JobSubmission};
use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub id: JobId,
    pub existed: bool,
}

/// POST /api/jobs - Validate, deduplicate and hand the job to the orchestrator
#[instrument(skip_all)]
pub async fn submit_job(
    State(state): State<SharedState>,
    Json(submission): Json<JobSubmission>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let job = validate(&submission)?;

    let allocation = state
        .identity
        .get_or_create(&job.fingerprint)
        .await
        .map_err(|e| ApiError::Identity(e.to_string()))?;

    let payload = JobPayload {
        job_id: allocation.job_id.clone(),
        job_existed: allocation.existed,
        input_kind: job.method.input_kind(),
        input_url: job.input_url,
        model_parameters: job.model_parameters,
    };
    // The ticket is dropped: progress is visible through the status routes.
    state.pool.submit(payload).map_err(|e| ApiError::Internal(e.into()))?;

    info!(
        job_id = %allocation.job_id,
        existed = allocation.existed,
        fingerprint = %job.fingerprint,
        "Job accepted"
    );
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { id: allocation.job_id, existed: allocation.existed })))
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub input_method: String,
    pub input_protein: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdLookup {
    pub id: Option<JobId>,
}

/// GET /api/id - Lookup only, never allocates
pub async fn lookup_id(
    State(state): State<SharedState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<IdLookup>, ApiError> {
    let method: InputMethod = query.input_method.parse()?;
    let fingerprint = Fingerprint::for_input(method, query.input_protein.as_deref())?;
    let id = state
        .identity
        .lookup(&fingerprint)
        .await
        .map_err(|e| ApiError::Identity(e.to_string()))?;
    Ok(Json(IdLookup { id }))
}

/// GET /api/jobs/{job_id} - Status and result chains of every task
pub async fn job_overview(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<TaskOverview>>, ApiError> {
    let job_id = JobId::parse(&job_id)?;
    let overview = state.results.overview(&job_id, state.tracker.as_ref()).await?;
    if overview.iter().all(|t| t.status.is_none() && t.chains.is_empty()) {
        return Err(ApiError::NotFound(format!("no tasks recorded for {}", job_id)));
    }
    Ok(Json(overview))
}
