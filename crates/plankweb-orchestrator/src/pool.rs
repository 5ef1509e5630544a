//! Bounded pool of orchestrator workers.
//!
//! A job holds its worker for the whole run, blocked waits included, so at
//! most `workers` jobs are orchestrated at once.

use plankweb_common::JobPayload;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

use crate::orchestrator::{Orchestrator, RunReport};

#[derive(Debug, Error)]
#[error("Orchestrator pool is shut down")]
pub struct PoolClosed;

struct Submission {
    payload: JobPayload,
    report: oneshot::Sender<RunReport>,
}

/// Resolves with the run report once the job has been orchestrated.
/// Dropping it does not affect the run.
pub type JobTicket = oneshot::Receiver<RunReport>;

#[derive(Clone)]
pub struct OrchestratorPool {
    tx: mpsc::UnboundedSender<Submission>,
}

impl OrchestratorPool {
    /// Spawn `workers` orchestrator workers. Must be called inside a tokio runtime.
    pub fn start(orchestrator: Arc<Orchestrator>, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Submission>();
        let rx = Arc::new(Mutex::new(rx));
        let workers = workers.max(1);

        for worker in 0..workers {
            let orchestrator = orchestrator.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(Submission { payload, report }) = next else { break };
                    let job_id = payload.job_id.clone();
                    debug!(worker, job_id = %job_id, "Orchestrator worker picked up job");

                    let run = tokio::spawn({
                        let orchestrator = orchestrator.clone();
                        async move { orchestrator.run(payload).await }
                    })
                    .await;
                    match run {
                        Ok(result) => {
                            let _ = report.send(result);
                        }
                        Err(e) => error!(job_id = %job_id, "Orchestration crashed: {}", e),
                    }
                }
                debug!(worker, "Orchestrator queue closed, worker exiting");
            });
        }
        info!(workers, "Started orchestrator pool");
        Self { tx }
    }

    pub fn submit(&self, payload: JobPayload) -> Result<JobTicket, PoolClosed> {
        let (report, ticket) = oneshot::channel();
        self.tx.send(Submission { payload, report }).map_err(|_| PoolClosed)?;
        Ok(ticket)
    }
}
