//! Handle to a dispatched task.

use plankweb_common::{JobId, TaskKey};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::DispatchError;
use crate::task::TaskOutput;

/// Terminal result of one task run.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskOutput),
    Failed(String),
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }
}

/// Worker side of a handle.
#[derive(Debug)]
pub struct OutcomeSender(watch::Sender<Option<TaskOutcome>>);

impl OutcomeSender {
    pub fn send(self, outcome: TaskOutcome) {
        // No receiver left means the caller detached; nothing to do.
        let _ = self.0.send(Some(outcome));
    }
}

#[derive(Debug)]
pub struct TaskHandle {
    job_id: JobId,
    key: TaskKey,
    rx: watch::Receiver<Option<TaskOutcome>>,
}

impl TaskHandle {
    /// A connected sender/handle pair.
    pub fn channel(job_id: JobId, key: TaskKey) -> (OutcomeSender, TaskHandle) {
        let (tx, rx) = watch::channel(None);
        (OutcomeSender(tx), TaskHandle { job_id, key, rx })
    }

    /// A handle that is already resolved.
    pub fn ready(job_id: JobId, key: TaskKey, outcome: TaskOutcome) -> TaskHandle {
        let (tx, handle) = Self::channel(job_id, key);
        tx.send(outcome);
        handle
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the outcome, waking at least every `poll_interval`.
    /// `timeout: None` waits forever.
    pub async fn block_until_ready(
        &mut self,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<TaskOutcome, DispatchError> {
        let started = Instant::now();
        loop {
            if let Some(outcome) = self.try_outcome() {
                return Ok(outcome);
            }

            let wait = match timeout {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        return Err(DispatchError::TimedOut { task: self.key.clone(), waited: elapsed });
                    }
                    poll_interval.min(limit - elapsed)
                }
                None => poll_interval,
            };

            match tokio::time::timeout(wait, self.rx.changed()).await {
                Ok(Ok(())) | Err(_) => continue,
                Ok(Err(_)) => {
                    return self.try_outcome().ok_or_else(|| DispatchError::WorkerLost(self.key.clone()));
                }
            }
        }
    }

    /// Fire-and-forget: drop interest in the outcome.
    pub fn detach(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankweb_common::TaskName;

    fn key() -> (JobId, TaskKey) {
        (JobId::parse("pdb_2src").unwrap(), TaskKey::new(TaskName::ConverterStrToSeq))
    }

    #[tokio::test]
    async fn test_resolves_when_worker_sends() {
        let (job, key) = key();
        let (tx, mut handle) = TaskHandle::channel(job, key);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(TaskOutcome::Completed(TaskOutput::done("ok")));
        });
        let outcome = handle.block_until_ready(Duration::from_millis(5), None).await.unwrap();
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_pending_until_outcome_sent() {
        let (job, key) = key();
        let (tx, mut handle) = TaskHandle::channel(job, key);
        let mut wait = tokio_test::task::spawn(handle.block_until_ready(Duration::from_secs(60), None));
        tokio_test::assert_pending!(wait.poll());

        tx.send(TaskOutcome::Failed("oom".to_string()));
        assert!(wait.is_woken());
        let outcome = tokio_test::assert_ready!(wait.poll()).unwrap();
        assert_eq!(outcome, TaskOutcome::Failed("oom".to_string()));
    }

    #[tokio::test]
    async fn test_times_out() {
        let (job, key) = key();
        let (_tx, mut handle) = TaskHandle::channel(job, key);
        let err = handle
            .block_until_ready(Duration::from_millis(10), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_worker_lost() {
        let (job, key) = key();
        let (tx, mut handle) = TaskHandle::channel(job, key);
        drop(tx);
        let err = handle.block_until_ready(Duration::from_millis(5), None).await.unwrap_err();
        assert!(matches!(err, DispatchError::WorkerLost(_)));
    }

    #[tokio::test]
    async fn test_ready_handle() {
        let (job, key) = key();
        let mut handle = TaskHandle::ready(job, key, TaskOutcome::Failed("boom".to_string()));
        assert_eq!(
            handle.block_until_ready(Duration::from_millis(1), None).await.unwrap(),
            TaskOutcome::Failed("boom".to_string())
        );
    }
}
