use plankweb_common::{TaskKey, TaskName};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No backend registered for {0}")]
    UnknownTask(TaskName),

    #[error("{0} is not a dispatchable backend")]
    NotABackend(TaskName),

    #[error("Missing backends: {0:?}")]
    MissingBackends(Vec<TaskName>),

    #[error("Queue for {0} is closed")]
    QueueClosed(TaskName),

    #[error("Worker for {0} went away without reporting an outcome")]
    WorkerLost(TaskKey),

    #[error("{task} did not finish within {waited:?}")]
    TimedOut { task: TaskKey, waited: Duration },

    #[error("Status tracker error: {0}")]
    Tracker(#[from] plankweb_store::StoreError),
}

/// Failure of a single backend run; becomes the FAILED record's message.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("missing input: {0}")]
    Input(String),

    #[error("{tool} exited with {code:?}: {stderr}")]
    Process { tool: String, code: Option<i32>, stderr: String },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("no usable output: {0}")]
    NoOutput(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Store(#[from] plankweb_store::StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    pub fn parse(what: impl Into<String>, detail: impl ToString) -> Self {
        BackendError::Parse { what: what.into(), detail: detail.to_string() }
    }
}

impl From<plankweb_common::error::PlankwebError> for BackendError {
    fn from(err: plankweb_common::error::PlankwebError) -> Self {
        use plankweb_common::error::PlankwebError;
        match err {
            PlankwebError::Http(e) => BackendError::Fetch(e.to_string()),
            PlankwebError::SecurityError(e) => BackendError::Fetch(e),
            PlankwebError::Io(e) => BackendError::Io(e),
            other => BackendError::Other(anyhow::Error::new(other)),
        }
    }
}
