//! Task identifiers and the per-task status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlankwebError;

/// Variant key of the conservation-aware pocket prediction.
pub const CONSERVATION_VARIANT: &str = "conservation";

// ── Task names ────────────────────────────────────────────────────────────────

/// Closed set of things the orchestrator can record a status for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskName {
    Foldseek,
    P2Rank,
    Plm,
    Conservation,
    ConverterSeqToStr,
    ConverterStrToSeq,
    /// Pseudo-task holding input materialization failures.
    Materialize,
}

impl TaskName {
    /// Every task a backend can be registered for.
    pub const BACKENDS: [TaskName; 6] = [
        TaskName::Foldseek,
        TaskName::P2Rank,
        TaskName::Plm,
        TaskName::Conservation,
        TaskName::ConverterSeqToStr,
        TaskName::ConverterStrToSeq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskName::Foldseek => "ds_foldseek",
            TaskName::P2Rank => "ds_p2rank",
            TaskName::Plm => "ds_plm",
            TaskName::Conservation => "conservation",
            TaskName::ConverterSeqToStr => "converter_seq_to_str",
            TaskName::ConverterStrToSeq => "converter_str_to_seq",
            TaskName::Materialize => "materialize",
        }
    }

    /// Data source label written into result documents.
    pub fn data_source(self) -> &'static str {
        match self {
            TaskName::Foldseek => "foldseek",
            TaskName::P2Rank => "p2rank",
            TaskName::Plm => "plm",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = PlankwebError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ds_foldseek" | "foldseek" => Ok(TaskName::Foldseek),
            "ds_p2rank" | "p2rank" => Ok(TaskName::P2Rank),
            "ds_plm" | "plm" => Ok(TaskName::Plm),
            "conservation" => Ok(TaskName::Conservation),
            "converter_seq_to_str" => Ok(TaskName::ConverterSeqToStr),
            "converter_str_to_seq" => Ok(TaskName::ConverterStrToSeq),
            "materialize" => Ok(TaskName::Materialize),
            other => Err(PlankwebError::InvalidInput(format!("unknown task: {}", other))),
        }
    }
}

impl TryFrom<String> for TaskName {
    type Error = PlankwebError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskName> for String {
    fn from(value: TaskName) -> Self {
        value.as_str().to_string()
    }
}

/// A task plus optional variant, e.g. `ds_p2rank/conservation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub task: TaskName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl TaskKey {
    pub fn new(task: TaskName) -> Self {
        Self { task, variant: None }
    }

    pub fn with_variant(task: TaskName, variant: impl Into<String>) -> Self {
        Self { task, variant: Some(variant.into()) }
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }
}

impl From<TaskName> for TaskKey {
    fn from(task: TaskName) -> Self {
        TaskKey::new(task)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}", self.task, variant),
            None => write!(f, "{}", self.task),
        }
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Lifecycle state of one task. Encoded as 0/1/2 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskStatus {
    Started,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn code(self) -> u8 {
        match self {
            TaskStatus::Started => 0,
            TaskStatus::Completed => 1,
            TaskStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Started)
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskStatus::Started),
            1 => Ok(TaskStatus::Completed),
            2 => Ok(TaskStatus::Failed),
            other => Err(format!("unknown status code {}", other)),
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(value: TaskStatus) -> Self {
        value.code()
    }
}

/// Durable per-task record, serialized as `status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: TaskStatus,
    #[serde(default)]
    pub info_message: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn started(info: impl Into<String>) -> Self {
        Self::new(TaskStatus::Started, info.into(), String::new())
    }

    pub fn completed(info: impl Into<String>) -> Self {
        Self::new(TaskStatus::Completed, info.into(), String::new())
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(TaskStatus::Failed, String::new(), error.into())
    }

    fn new(status: TaskStatus, info_message: String, error_message: String) -> Self {
        Self { status, info_message, error_message, updated_at: Some(Utc::now()) }
    }

    /// True when a fresh dispatch would duplicate or redo the work.
    pub fn is_running_or_completed(&self) -> bool {
        matches!(self.status, TaskStatus::Started | TaskStatus::Completed)
    }
}
