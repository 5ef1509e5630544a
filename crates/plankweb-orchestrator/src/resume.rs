//! Resumption rule: whether a task of a re-submitted job runs again.

use chrono::{DateTime, Utc};
use plankweb_common::{StatusRecord, TaskStatus};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Dispatch(DispatchReason),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReason {
    NewJob,
    NeverStarted,
    PreviouslyFailed,
    /// STARTED for longer than the configured grace period.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Running,
    Completed,
}

impl Decision {
    pub fn should_dispatch(self) -> bool {
        matches!(self, Decision::Dispatch(_))
    }
}

/// Dispatch iff the job is new, the task has no record, or its record is
/// neither STARTED nor COMPLETED. With `started_grace` set, a STARTED record
/// older than the grace (or without a timestamp) counts as abandoned.
pub fn decide(
    existed: bool,
    record: Option<&StatusRecord>,
    started_grace: Option<Duration>,
    now: DateTime<Utc>,
) -> Decision {
    if !existed {
        return Decision::Dispatch(DispatchReason::NewJob);
    }
    let Some(record) = record else {
        return Decision::Dispatch(DispatchReason::NeverStarted);
    };
    match record.status {
        TaskStatus::Completed => Decision::Skip(SkipReason::Completed),
        TaskStatus::Failed => Decision::Dispatch(DispatchReason::PreviouslyFailed),
        TaskStatus::Started => match started_grace {
            None => Decision::Skip(SkipReason::Running),
            Some(grace) => {
                let stale = match record.updated_at {
                    Some(at) => (now - at).to_std().map(|age| age > grace).unwrap_or(false),
                    None => true,
                };
                if stale {
                    Decision::Dispatch(DispatchReason::Stale)
                } else {
                    Decision::Skip(SkipReason::Running)
                }
            }
        },
    }
}
