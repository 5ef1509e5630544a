//! Scripted fakes and fixtures shared by the PlankWeb integration suites.
//!
//! Only integration tests (`tests/` directories) depend on this crate, so it
//! can use the library crates without creating dev-dependency cycles.

use async_trait::async_trait;
use plankweb_common::error::{PlankwebError, Result as CommonResult};
use plankweb_common::fetch::InputSource;
use plankweb_common::{JobId, StatusRecord, TaskKey, TaskName};
use plankweb_dispatch::{
    AnalysisBackend, BackendError, DispatchError, OutcomeSender, TaskDispatch, TaskHandle, TaskOutcome, TaskOutput,
    TaskRequest,
};
use plankweb_store::{ArtifactStore, InMemoryStatusTracker, StatusTracker, StoreLayout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub use pretty_assertions::{assert_eq, assert_ne};

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub const PUBLIC_URL: &str = "http://localhost:8020/data";

/// Two chains with identical sequence (MKG) plus a ligand near chain A.
pub const TWO_CHAIN_PDB: &str = "\
ATOM      1  CA  MET A   1      10.000  10.000  10.000  1.00  0.00           C
ATOM      2  CA  LYS A   2      14.000  10.000  10.000  1.00  0.00           C
ATOM      3  CA  GLY A   3      17.000  10.000  10.000  1.00  0.00           C
TER
ATOM      4  CA  MET B   1      40.000  10.000  10.000  1.00  0.00           C
ATOM      5  CA  LYS B   2      43.000  10.000  10.000  1.00  0.00           C
ATOM      6  CA  GLY B   3      46.000  10.000  10.000  1.00  0.00           C
TER
HETATM    7  C1  ATP A 101      12.000  12.000  10.000  1.00  0.00           C
END
";

pub fn job(id: &str) -> JobId {
    JobId::parse(id).unwrap()
}

/// A valid protein sequence of `len` residues.
pub fn protein_sequence(len: usize) -> String {
    "ACDEFGHIKLMNPQRSTVWY".chars().cycle().take(len).collect()
}

/// Temporary artifact root with an in-memory tracker.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub artifacts: Arc<ArtifactStore>,
    pub tracker: Arc<InMemoryStatusTracker>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(StoreLayout::new(dir.path()), PUBLIC_URL));
        Self { dir, artifacts, tracker: Arc::new(InMemoryStatusTracker::new()) }
    }

    pub fn tracker_dyn(&self) -> Arc<dyn StatusTracker> {
        self.tracker.clone()
    }

    pub async fn status(&self, job_id: &JobId, key: &TaskKey) -> Option<StatusRecord> {
        self.tracker.read(job_id, key).await.unwrap()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

// ── Input source ──────────────────────────────────────────────────────────────

/// In-memory [`InputSource`]; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct StaticSource {
    inputs: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.inputs.lock().unwrap().insert(url.to_string(), bytes.into());
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InputSource for StaticSource {
    async fn fetch(&self, url: &str) -> CommonResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PlankwebError::InvalidInput(format!("unreachable: {}", url)))
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// What a scripted task does once enqueued.
#[derive(Debug, Clone)]
pub enum Script {
    Complete(TaskOutput),
    Fail(String),
    /// Stays STARTED and never resolves its handle.
    Hang,
    /// `enqueue` itself fails.
    Reject,
}

/// [`TaskDispatch`] that records every request and resolves handles
/// immediately from a script, writing status the way the real queues do.
pub struct RecordingDispatch {
    tracker: Arc<dyn StatusTracker>,
    scripts: Mutex<HashMap<TaskKey, Script>>,
    enqueued: Mutex<Vec<TaskRequest>>,
    hanging: Mutex<Vec<OutcomeSender>>,
}

impl RecordingDispatch {
    /// Unscripted tasks complete with `"ok"`.
    pub fn new(tracker: Arc<dyn StatusTracker>) -> Self {
        Self {
            tracker,
            scripts: Mutex::new(HashMap::new()),
            enqueued: Mutex::new(Vec::new()),
            hanging: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, key: impl Into<TaskKey>, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(key.into(), script);
        self
    }

    pub fn requests(&self) -> Vec<TaskRequest> {
        self.enqueued.lock().unwrap().clone()
    }

    /// Enqueued keys in order.
    pub fn keys(&self) -> Vec<TaskKey> {
        self.requests().into_iter().map(|r| r.key).collect()
    }

    pub fn count(&self, key: &TaskKey) -> usize {
        self.requests().iter().filter(|r| &r.key == key).count()
    }

    pub fn position(&self, key: &TaskKey) -> Option<usize> {
        self.requests().iter().position(|r| &r.key == key)
    }
}

#[async_trait]
impl TaskDispatch for RecordingDispatch {
    async fn enqueue(&self, request: TaskRequest) -> Result<TaskHandle, DispatchError> {
        self.enqueued.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.key)
            .cloned()
            .unwrap_or_else(|| Script::Complete(TaskOutput::done("ok")));

        let TaskRequest { job_id, key, .. } = request;
        if let Script::Reject = script {
            return Err(DispatchError::UnknownTask(key.task));
        }
        self.tracker.write(&job_id, &key, &StatusRecord::started("Task queued")).await?;

        match script {
            Script::Complete(output) => {
                self.tracker.write(&job_id, &key, &StatusRecord::completed(output.summary())).await?;
                Ok(TaskHandle::ready(job_id, key, TaskOutcome::Completed(output)))
            }
            Script::Fail(message) => {
                self.tracker.write(&job_id, &key, &StatusRecord::failed(message.clone())).await?;
                Ok(TaskHandle::ready(job_id, key, TaskOutcome::Failed(message)))
            }
            Script::Hang | Script::Reject => {
                let (sender, handle) = TaskHandle::channel(job_id, key);
                self.hanging.lock().unwrap().push(sender);
                Ok(handle)
            }
        }
    }
}

// ── Backends ──────────────────────────────────────────────────────────────────

/// Backend that returns a fixed result after an optional delay and counts runs.
pub struct FakeBackend {
    task: TaskName,
    result: std::result::Result<TaskOutput, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeBackend {
    pub fn completing(task: TaskName, output: TaskOutput) -> Self {
        Self { task, result: Ok(output), delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn failing(task: TaskName, message: &str) -> Self {
        Self { task, result: Err(message.to_string()), delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    fn task(&self) -> TaskName {
        self.task
    }

    async fn run(&self, _request: &TaskRequest) -> std::result::Result<TaskOutput, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone().map_err(BackendError::NoOutput)
    }
}
