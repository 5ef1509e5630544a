//! Converters between the two input kinds.
//!
//! Neither writes canonical inputs; the output travels back through the task
//! handle and the orchestrator stores it.

use async_trait::async_trait;
use plankweb_common::chains::sequence_file_name;
use plankweb_common::fasta;
use plankweb_common::fetch::FetchClient;
use plankweb_common::TaskName;
use plankweb_dispatch::{AnalysisBackend, BackendError, TaskOutput, TaskRequest};
use plankweb_store::artifacts::STRUCTURE_FILE;
use tracing::info;

use crate::context::BackendContext;
use crate::structure::{extract_sequences, parse_pdb};

/// Structure → sequences, one per distinct chain sequence.
pub struct StrToSeqConverter {
    ctx: BackendContext,
}

impl StrToSeqConverter {
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl AnalysisBackend for StrToSeqConverter {
    fn task(&self) -> TaskName {
        TaskName::ConverterStrToSeq
    }

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError> {
        let text = self
            .ctx
            .artifacts
            .read_input_string(&request.job_id, STRUCTURE_FILE)
            .await
            .map_err(|e| BackendError::Input(format!("{}: {}", STRUCTURE_FILE, e)))?;

        let converted = extract_sequences(&parse_pdb(&text));
        if converted.is_empty() {
            return Err(BackendError::NoOutput("structure contains no protein chains".to_string()));
        }
        info!(job_id = %request.job_id, groups = converted.groups.len(), "Extracted sequences");
        Ok(TaskOutput::Sequences(converted))
    }
}

/// Sequence → structure through a remote folding service.
pub struct SeqToStrConverter {
    client: FetchClient,
    url: String,
    ctx: BackendContext,
}

impl SeqToStrConverter {
    pub fn new(client: FetchClient, url: impl Into<String>, ctx: BackendContext) -> Self {
        Self { client, url: url.into(), ctx }
    }
}

#[async_trait]
impl AnalysisBackend for SeqToStrConverter {
    fn task(&self) -> TaskName {
        TaskName::ConverterSeqToStr
    }

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError> {
        let file = sequence_file_name(1);
        let text = self
            .ctx
            .artifacts
            .read_input_string(&request.job_id, &file)
            .await
            .map_err(|e| BackendError::Input(format!("{}: {}", file, e)))?;
        let sequence = fasta::first_sequence(&text)
            .ok_or_else(|| BackendError::Input(format!("{} holds no sequence", file)))?;

        info!(job_id = %request.job_id, residues = sequence.len(), "Requesting predicted structure");
        let response = self
            .client
            .post(&self.url)?
            .body(sequence)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BackendError::Fetch(format!("{}: {}", self.url, e)))?;
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Fetch(format!("{}: {}", self.url, e)))?;

        if !body.lines().any(|l| l.starts_with("ATOM")) {
            return Err(BackendError::NoOutput("folding service returned no atoms".to_string()));
        }
        Ok(TaskOutput::Structure(body))
    }
}
