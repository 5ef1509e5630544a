//! In-process queues, one per backend, each drained by a worker pool.

use async_trait::async_trait;
use plankweb_common::{StatusRecord, TaskName};
use plankweb_store::StatusTracker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::handle::{OutcomeSender, TaskHandle, TaskOutcome};
use crate::registry::{AnalysisBackend, BackendRegistry};
use crate::task::TaskRequest;

/// Seam between the orchestrator and the worker pools.
#[async_trait]
pub trait TaskDispatch: Send + Sync {
    /// Record STARTED and queue the request.
    async fn enqueue(&self, request: TaskRequest) -> Result<TaskHandle, DispatchError>;
}

struct Envelope {
    request: TaskRequest,
    outcome: OutcomeSender,
}

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>;

pub struct QueueDispatcher {
    queues: HashMap<TaskName, mpsc::UnboundedSender<Envelope>>,
    tracker: Arc<dyn StatusTracker>,
}

impl QueueDispatcher {
    /// Spawn `workers(task)` workers for every registered backend.
    /// Must be called inside a tokio runtime.
    pub fn start(
        registry: &BackendRegistry,
        tracker: Arc<dyn StatusTracker>,
        workers: impl Fn(TaskName) -> usize,
    ) -> Self {
        let mut queues = HashMap::new();

        for task in registry.tasks() {
            let Some(backend) = registry.get(task) else { continue };
            let (tx, rx) = mpsc::unbounded_channel::<Envelope>();
            let rx: SharedReceiver = Arc::new(Mutex::new(rx));
            let count = workers(task).max(1);

            for worker in 0..count {
                tokio::spawn(worker_loop(task, worker, backend.clone(), tracker.clone(), rx.clone()));
            }
            info!(task = %task, workers = count, "Started backend queue");
            queues.insert(task, tx);
        }

        Self { queues, tracker }
    }

    pub fn tasks(&self) -> Vec<TaskName> {
        let mut tasks: Vec<_> = self.queues.keys().copied().collect();
        tasks.sort();
        tasks
    }
}

#[async_trait]
impl TaskDispatch for QueueDispatcher {
    async fn enqueue(&self, request: TaskRequest) -> Result<TaskHandle, DispatchError> {
        let task = request.task();
        let queue = self.queues.get(&task).ok_or(DispatchError::UnknownTask(task))?;

        // STARTED goes in before the worker can possibly write a terminal state.
        self.tracker
            .write(&request.job_id, &request.key, &StatusRecord::started("Task queued"))
            .await?;

        let (outcome, handle) = TaskHandle::channel(request.job_id.clone(), request.key.clone());
        debug!(job_id = %request.job_id, task = %request.key, "Enqueued");
        queue
            .send(Envelope { request, outcome })
            .map_err(|_| DispatchError::QueueClosed(task))?;
        Ok(handle)
    }
}

async fn worker_loop(
    task: TaskName,
    worker: usize,
    backend: Arc<dyn AnalysisBackend>,
    tracker: Arc<dyn StatusTracker>,
    rx: SharedReceiver,
) {
    debug!(task = %task, worker, "Worker ready");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(envelope) = next else { break };
        run_one(backend.clone(), tracker.as_ref(), envelope).await;
    }
    debug!(task = %task, worker, "Queue closed, worker exiting");
}

async fn run_one(backend: Arc<dyn AnalysisBackend>, tracker: &dyn StatusTracker, envelope: Envelope) {
    let Envelope { request, outcome } = envelope;
    let job_id = request.job_id.clone();
    let key = request.key.clone();
    info!(job_id = %job_id, task = %key, "Task running");

    // A panicking backend only takes down its own spawned task.
    let joined = tokio::spawn({
        let request = request.clone();
        async move { backend.run(&request).await }
    })
    .await;

    let (record, result) = match joined {
        Ok(Ok(output)) => {
            info!(job_id = %job_id, task = %key, "Task completed");
            (StatusRecord::completed(output.summary()), TaskOutcome::Completed(output))
        }
        Ok(Err(e)) => {
            warn!(job_id = %job_id, task = %key, "Task failed: {}", e);
            (StatusRecord::failed(e.to_string()), TaskOutcome::Failed(e.to_string()))
        }
        Err(join_error) => {
            let message = format!("backend crashed: {}", join_error);
            error!(job_id = %job_id, task = %key, "{}", message);
            (StatusRecord::failed(message.clone()), TaskOutcome::Failed(message))
        }
    };

    if let Err(e) = tracker.write(&job_id, &key, &record).await {
        warn!(job_id = %job_id, task = %key, "Failed to record terminal status: {}", e);
    }
    outcome.send(result);
}
