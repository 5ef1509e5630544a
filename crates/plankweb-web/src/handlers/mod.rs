pub mod jobs;
pub mod results;
pub mod status;

use plankweb_common::{JobId, TaskKey, TaskName};
use serde::Deserialize;

use crate::error::ApiError;

/// `?variant=` on per-task routes.
#[derive(Debug, Default, Deserialize)]
pub struct VariantQuery {
    pub variant: Option<String>,
}

/// Parse the `{task}/{job_id}` path pair shared by status and result routes.
pub(crate) fn task_key(task: &str, job_id: &str, query: VariantQuery) -> Result<(JobId, TaskKey), ApiError> {
    let task: TaskName = task.parse()?;
    let job_id = JobId::parse(job_id)?;
    let key = match query.variant.filter(|v| !v.is_empty()) {
        Some(variant) => TaskKey::with_variant(task, path_component(variant, "variant")?),
        None => TaskKey::new(task),
    };
    Ok((job_id, key))
}

/// Variants and chain ids end up in file paths.
pub(crate) fn path_component(value: String, what: &str) -> Result<String, ApiError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ApiError::BadRequest(format!("invalid {}: {}", what, value)));
    }
    Ok(value)
}
