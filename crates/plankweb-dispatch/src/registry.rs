//! Typed mapping from task name to backend handler.

use async_trait::async_trait;
use plankweb_common::TaskName;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::{BackendError, DispatchError};
use crate::task::{TaskOutput, TaskRequest};

/// One analysis computation. Runs must be idempotent: a re-delivered request
/// overwrites the same result files.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn task(&self) -> TaskName;

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError>;
}

#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<TaskName, Arc<dyn AnalysisBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own task name, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn AnalysisBackend>) -> Result<(), DispatchError> {
        let task = backend.task();
        if !TaskName::BACKENDS.contains(&task) {
            return Err(DispatchError::NotABackend(task));
        }
        if self.backends.insert(task, backend).is_some() {
            warn!(task = %task, "Backend registered twice, keeping the latest");
        }
        Ok(())
    }

    pub fn get(&self, task: TaskName) -> Option<Arc<dyn AnalysisBackend>> {
        self.backends.get(&task).cloned()
    }

    /// Registered task names, sorted.
    pub fn tasks(&self) -> Vec<TaskName> {
        let mut tasks: Vec<_> = self.backends.keys().copied().collect();
        tasks.sort();
        tasks
    }

    /// Fail unless every task in `required` has a backend.
    pub fn require(&self, required: &[TaskName]) -> Result<(), DispatchError> {
        let missing: Vec<TaskName> =
            required.iter().copied().filter(|t| !self.backends.contains_key(t)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::MissingBackends(missing))
        }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
