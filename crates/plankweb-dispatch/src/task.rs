//! What travels through a queue and what comes back.

use plankweb_common::{ConvertedSequences, JobId, TaskKey, TaskName};
use serde::{Deserialize, Serialize};

/// Per-run arguments. Backends read their inputs from the artifact store by job id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Model name for backends that take one (P2Rank).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub use_conservation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub job_id: JobId,
    pub key: TaskKey,
    #[serde(default)]
    pub args: TaskArgs,
}

impl TaskRequest {
    pub fn new(job_id: JobId, task: TaskName) -> Self {
        Self { job_id, key: TaskKey::new(task), args: TaskArgs::default() }
    }

    pub fn with_key(job_id: JobId, key: TaskKey, args: TaskArgs) -> Self {
        Self { job_id, key, args }
    }

    pub fn task(&self) -> TaskName {
        self.key.task
    }
}

/// Successful backend result.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// Results were written to the artifact store.
    Done { message: String },
    /// PDB text from sequence → structure conversion.
    Structure(String),
    /// Sequences from structure → sequence conversion.
    Sequences(ConvertedSequences),
}

impl TaskOutput {
    pub fn done(message: impl Into<String>) -> Self {
        TaskOutput::Done { message: message.into() }
    }

    /// Info message for the COMPLETED record.
    pub fn summary(&self) -> String {
        match self {
            TaskOutput::Done { message } => message.clone(),
            TaskOutput::Structure(pdb) => format!("structure with {} lines", pdb.lines().count()),
            TaskOutput::Sequences(converted) => {
                let chains: usize = converted.groups.iter().map(|g| g.chains.len()).sum();
                format!("{} sequences for {} chains", converted.groups.len(), chains)
            }
        }
    }
}
