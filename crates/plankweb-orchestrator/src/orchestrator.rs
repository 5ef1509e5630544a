//! Two-wave job orchestration.
//!
//! Orchestrates one job from its entry payload:
//!   1. Materialize the submitted input (structure or sequence set)
//!   2. Fan out the backends native to that input kind
//!   3. Run the conversion barrier when the other input kind is missing
//!   4. Fan out the backends that needed the converted input
//!   5. Wait on conservation this run dispatched, then run the
//!      conservation-aware P2Rank variant
//!
//! Every task goes through the resumption rule. Nothing is raised to the
//! caller: failures end up in the status tracker and in the [`RunReport`].

use chrono::Utc;
use plankweb_common::params::p2rank_model;
use plankweb_common::status::CONSERVATION_VARIANT;
use plankweb_common::{InputKind, JobId, JobPayload, StatusRecord, TaskKey, TaskName, TaskStatus};
use plankweb_config::OrchestratorConfig;
use plankweb_dispatch::{TaskArgs, TaskDispatch, TaskHandle, TaskOutcome, TaskOutput, TaskRequest};
use plankweb_store::{read_or_absent, StatusTracker};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::materializer::InputMaterializer;
use crate::resume::{decide, Decision};

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub conversion_poll: Duration,
    pub conservation_poll: Duration,
    /// `None` waits for the conversion forever.
    pub barrier_timeout: Option<Duration>,
    /// `None` waits for conservation forever.
    pub gate_timeout: Option<Duration>,
    /// `None` trusts STARTED records forever.
    pub started_grace: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            conversion_poll: config.conversion_poll(),
            conservation_poll: config.conservation_poll(),
            barrier_timeout: config.barrier_timeout(),
            gate_timeout: config.gate_timeout(),
            started_grace: config.started_grace(),
        }
    }
}

// ── Run report ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    PreparingInput,
    FirstWave,
    Converting,
    SecondWave,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierOutcome {
    /// The converted input was already present.
    NotNeeded,
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    NotRequested,
    Opened,
    Closed(String),
    /// Conservation belongs to another run that has not finished; that run
    /// dispatches the variant.
    Deferred(String),
}

/// What one orchestration run did. Informational only.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub job_id: JobId,
    pub phase: JobPhase,
    pub dispatched: Vec<TaskKey>,
    pub skipped: Vec<TaskKey>,
    /// Tasks whose enqueue itself failed; recorded as FAILED.
    pub rejected: Vec<TaskKey>,
    pub barrier: Option<BarrierOutcome>,
    pub gate: GateOutcome,
    pub error: Option<String>,
}

impl RunReport {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            phase: JobPhase::PreparingInput,
            dispatched: Vec::new(),
            skipped: Vec::new(),
            rejected: Vec::new(),
            barrier: None,
            gate: GateOutcome::NotRequested,
            error: None,
        }
    }

    pub fn was_dispatched(&self, key: &TaskKey) -> bool {
        self.dispatched.contains(key)
    }
}

/// How the conservation task of this run can be waited on.
enum Conservation {
    NotRequested,
    Dispatched(TaskHandle),
    /// Skipped or rejected; its current record decides the gate.
    Tracked,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator {
    tracker: Arc<dyn StatusTracker>,
    dispatch: Arc<dyn TaskDispatch>,
    materializer: Arc<InputMaterializer>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        tracker: Arc<dyn StatusTracker>,
        dispatch: Arc<dyn TaskDispatch>,
        materializer: Arc<InputMaterializer>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { tracker, dispatch, materializer, settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Drive one job through both waves.
    #[instrument(skip(self, payload), fields(job_id = %payload.job_id, kind = %payload.input_kind))]
    pub async fn run(&self, payload: JobPayload) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(payload.job_id.clone());
        info!(existed = payload.job_existed, "Orchestrating job");

        match payload.input_kind {
            InputKind::Sequence => self.run_sequence(&payload, &mut report).await,
            InputKind::Structure => self.run_structure(&payload, &mut report).await,
        }

        info!(
            phase = ?report.phase,
            dispatched = report.dispatched.len(),
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Orchestration finished"
        );
        report
    }

    async fn run_sequence(&self, payload: &JobPayload, report: &mut RunReport) {
        let job_id = &payload.job_id;

        if let Err(e) = self.materializer.ensure_sequence_set(job_id, &payload.input_url).await {
            return self.abort_materialize(job_id, e.to_string(), report).await;
        }
        self.record_materialized(job_id).await;

        report.phase = JobPhase::FirstWave;
        self.fire(payload, TaskKey::new(TaskName::Plm), TaskArgs::default(), report).await;
        let conservation = self.start_conservation(payload, report).await;

        report.phase = JobPhase::Converting;
        let needs_structure = !payload.job_existed || !self.inputs_ready(job_id).await;
        if needs_structure {
            let barrier = self.convert(payload, TaskName::ConverterSeqToStr, report).await;
            let passed = barrier == BarrierOutcome::Completed;
            report.barrier = Some(barrier);
            if !passed {
                return;
            }
        } else {
            report.barrier = Some(BarrierOutcome::NotNeeded);
        }

        report.phase = JobPhase::SecondWave;
        self.structure_wave(payload, report).await;
        self.gated_variant(payload, conservation, report).await;
        report.phase = JobPhase::Done;
    }

    async fn run_structure(&self, payload: &JobPayload, report: &mut RunReport) {
        let job_id = &payload.job_id;

        if let Err(e) = self.materializer.ensure_structure(job_id, &payload.input_url).await {
            return self.abort_materialize(job_id, e.to_string(), report).await;
        }
        self.record_materialized(job_id).await;

        report.phase = JobPhase::FirstWave;
        self.structure_wave(payload, report).await;

        report.phase = JobPhase::Converting;
        let needs_sequences = !payload.job_existed || !self.inputs_ready(job_id).await;
        if needs_sequences {
            let barrier = self.convert(payload, TaskName::ConverterStrToSeq, report).await;
            let passed = barrier == BarrierOutcome::Completed;
            report.barrier = Some(barrier);
            if !passed {
                return;
            }
        } else {
            report.barrier = Some(BarrierOutcome::NotNeeded);
        }

        report.phase = JobPhase::SecondWave;
        self.fire(payload, TaskKey::new(TaskName::Plm), TaskArgs::default(), report).await;
        let conservation = self.start_conservation(payload, report).await;
        self.gated_variant(payload, conservation, report).await;
        report.phase = JobPhase::Done;
    }

    /// Foldseek and P2Rank without conservation.
    async fn structure_wave(&self, payload: &JobPayload, report: &mut RunReport) {
        self.fire(payload, TaskKey::new(TaskName::Foldseek), TaskArgs::default(), report).await;
        let args = TaskArgs {
            model: Some(p2rank_model(payload.model_parameters.profile, false).to_string()),
            use_conservation: false,
        };
        self.fire(payload, TaskKey::new(TaskName::P2Rank), args, report).await;
    }

    async fn inputs_ready(&self, job_id: &JobId) -> bool {
        match self.materializer.inputs_complete(job_id).await {
            Ok(complete) => complete,
            Err(e) => {
                warn!(job_id = %job_id, "Could not check inputs, converting again: {}", e);
                false
            }
        }
    }

    async fn abort_materialize(&self, job_id: &JobId, message: String, report: &mut RunReport) {
        warn!(job_id = %job_id, "Input materialization failed: {}", message);
        self.record_failed(job_id, &TaskKey::new(TaskName::Materialize), &message).await;
        report.error = Some(message);
    }

    /// Overwrites a FAILED record left by an earlier run.
    async fn record_materialized(&self, job_id: &JobId) {
        let key = TaskKey::new(TaskName::Materialize);
        if let Err(e) = self.tracker.write(job_id, &key, &StatusRecord::completed("Input ready")).await {
            warn!(job_id = %job_id, "Failed to record materialized input: {}", e);
        }
    }

    // ── Dispatch helpers ──────────────────────────────────────────────────────

    /// Enqueue unless the resumption rule says the task is running or done.
    async fn dispatch(
        &self,
        payload: &JobPayload,
        key: TaskKey,
        args: TaskArgs,
        report: &mut RunReport,
    ) -> Option<TaskHandle> {
        let job_id = &payload.job_id;
        let record = if payload.job_existed {
            read_or_absent(self.tracker.as_ref(), job_id, &key).await
        } else {
            None
        };
        let decision = decide(payload.job_existed, record.as_ref(), self.settings.started_grace, Utc::now());
        if let Decision::Skip(reason) = decision {
            debug!(job_id = %job_id, task = %key, ?reason, "Skipping task");
            report.skipped.push(key);
            return None;
        }
        self.enqueue(job_id, key, args, report).await
    }

    async fn enqueue(&self, job_id: &JobId, key: TaskKey, args: TaskArgs, report: &mut RunReport) -> Option<TaskHandle> {
        match self.dispatch.enqueue(TaskRequest::with_key(job_id.clone(), key.clone(), args)).await {
            Ok(handle) => {
                report.dispatched.push(key);
                Some(handle)
            }
            Err(e) => {
                warn!(job_id = %job_id, task = %key, "Dispatch failed: {}", e);
                self.record_failed(job_id, &key, &format!("dispatch failed: {}", e)).await;
                report.rejected.push(key);
                None
            }
        }
    }

    /// Dispatch and forget.
    async fn fire(&self, payload: &JobPayload, key: TaskKey, args: TaskArgs, report: &mut RunReport) {
        if let Some(handle) = self.dispatch(payload, key, args, report).await {
            handle.detach();
        }
    }

    async fn record_failed(&self, job_id: &JobId, key: &TaskKey, message: &str) {
        if let Err(e) = self.tracker.write(job_id, key, &StatusRecord::failed(message)).await {
            warn!(job_id = %job_id, task = %key, "Failed to record failure: {}", e);
        }
    }

    // ── Barrier ───────────────────────────────────────────────────────────────

    /// Run a converter and persist its output. The converter always runs when
    /// called: the missing artifact is what makes it necessary.
    async fn convert(&self, payload: &JobPayload, converter: TaskName, report: &mut RunReport) -> BarrierOutcome {
        let job_id = &payload.job_id;
        let key = TaskKey::new(converter);

        let Some(mut handle) = self.enqueue(job_id, key.clone(), TaskArgs::default(), report).await else {
            return BarrierOutcome::Failed("converter could not be dispatched".to_string());
        };

        let outcome = handle
            .block_until_ready(self.settings.conversion_poll, self.settings.barrier_timeout)
            .await;
        let failure = match outcome {
            Ok(TaskOutcome::Completed(output)) => match self.persist_conversion(job_id, output).await {
                Ok(()) => {
                    info!(job_id = %job_id, task = %key, "Conversion barrier passed");
                    return BarrierOutcome::Completed;
                }
                Err(message) => {
                    self.record_failed(job_id, &key, &message).await;
                    message
                }
            },
            // The worker already recorded FAILED.
            Ok(TaskOutcome::Failed(message)) => message,
            // Timed out or the worker vanished; the record may still say STARTED.
            Err(e) => {
                let message = e.to_string();
                self.record_failed(job_id, &key, &message).await;
                message
            }
        };

        warn!(job_id = %job_id, task = %key, "Conversion barrier failed, skipping dependent tasks: {}", failure);
        BarrierOutcome::Failed(failure)
    }

    async fn persist_conversion(&self, job_id: &JobId, output: TaskOutput) -> Result<(), String> {
        match output {
            TaskOutput::Structure(pdb) => self
                .materializer
                .store_converted_structure(job_id, &pdb)
                .await
                .map(|_| ())
                .map_err(|e| format!("storing converted structure: {}", e)),
            TaskOutput::Sequences(converted) => self
                .materializer
                .store_converted_sequences(job_id, &converted)
                .await
                .map(|_| ())
                .map_err(|e| format!("storing converted sequences: {}", e)),
            TaskOutput::Done { message } => Err(format!("converter returned no data: {}", message)),
        }
    }

    // ── Conservation gate ─────────────────────────────────────────────────────

    async fn start_conservation(&self, payload: &JobPayload, report: &mut RunReport) -> Conservation {
        if !payload.model_parameters.conservation {
            return Conservation::NotRequested;
        }
        match self.dispatch(payload, TaskKey::new(TaskName::Conservation), TaskArgs::default(), report).await {
            Some(handle) => Conservation::Dispatched(handle),
            None => Conservation::Tracked,
        }
    }

    async fn gated_variant(&self, payload: &JobPayload, conservation: Conservation, report: &mut RunReport) {
        let job_id = &payload.job_id;
        let variant = TaskKey::with_variant(TaskName::P2Rank, CONSERVATION_VARIANT);

        let gate = match conservation {
            Conservation::NotRequested => {
                report.gate = GateOutcome::NotRequested;
                return;
            }
            Conservation::Dispatched(mut handle) => {
                match handle
                    .block_until_ready(self.settings.conservation_poll, self.settings.gate_timeout)
                    .await
                {
                    Ok(TaskOutcome::Completed(_)) => GateOutcome::Opened,
                    Ok(TaskOutcome::Failed(message)) => GateOutcome::Closed(message),
                    Err(e) => GateOutcome::Closed(e.to_string()),
                }
            }
            Conservation::Tracked => self.tracked_conservation(job_id).await,
        };

        match &gate {
            GateOutcome::Opened => {
                let args = TaskArgs {
                    model: Some(p2rank_model(payload.model_parameters.profile, true).to_string()),
                    use_conservation: true,
                };
                if let Some(handle) = self.dispatch(payload, variant, args, report).await {
                    handle.detach();
                }
            }
            GateOutcome::Closed(reason) => {
                info!(job_id = %job_id, "Conservation gate closed: {}", reason);
            }
            GateOutcome::Deferred(reason) => {
                debug!(job_id = %job_id, "Leaving conservation variant to its owner: {}", reason);
            }
            GateOutcome::NotRequested => {}
        }
        report.gate = gate;
    }

    /// Conservation was not dispatched by this run; its record is read once.
    async fn tracked_conservation(&self, job_id: &JobId) -> GateOutcome {
        let key = TaskKey::new(TaskName::Conservation);
        match read_or_absent(self.tracker.as_ref(), job_id, &key).await.map(|r| r.status) {
            Some(TaskStatus::Completed) => GateOutcome::Opened,
            Some(TaskStatus::Failed) => GateOutcome::Closed("conservation failed".to_string()),
            Some(TaskStatus::Started) => GateOutcome::Deferred("conservation still running".to_string()),
            None => GateOutcome::Deferred("conservation has no record".to_string()),
        }
    }
}
