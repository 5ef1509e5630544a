//! Protein-language-model binding prediction.
//!
//! All distinct sequences go to the model in one combined FASTA; its JSON
//! output carries one per-residue binding probability vector per sequence.

use async_trait::async_trait;
use plankweb_common::fasta;
use plankweb_common::result_doc::{BindingSite, ResidueRef, ResultDocument};
use plankweb_common::{ChainMap, JobId, TaskName};
use plankweb_dispatch::{AnalysisBackend, BackendError, TaskOutput, TaskRequest};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

use crate::context::{structure_index, BackendContext, ChainSequence};
use crate::runner::ToolRunner;

pub const PLM_SITE_ID: &str = "pocket_plm";

#[derive(Debug, Clone, Deserialize)]
pub struct PlmPrediction {
    pub sequence: String,
    pub binding: Vec<f64>,
}

pub struct PlmBackend {
    runner: ToolRunner,
    threshold: f64,
    ctx: BackendContext,
}

impl PlmBackend {
    pub fn new(runner: ToolRunner, threshold: f64, ctx: BackendContext) -> Self {
        Self { runner, threshold, ctx }
    }
}

#[async_trait]
impl AnalysisBackend for PlmBackend {
    fn task(&self) -> TaskName {
        TaskName::Plm
    }

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError> {
        let job_id = &request.job_id;
        let (map, sequences) = self.ctx.chain_sequences(job_id).await?;
        let dir = self.ctx.artifacts.ensure_result_dir(job_id, &request.key).await?;

        let mut combined = String::new();
        let mut seen = Vec::new();
        for chain in &sequences {
            if !seen.contains(&chain.file) {
                combined.push_str(&fasta::render_record(&chain.file, &chain.sequence));
                seen.push(chain.file.clone());
            }
        }
        let fasta_path = dir.join("combined.fasta");
        let out_path = dir.join("predictions.json");
        tokio::fs::write(&fasta_path, combined).await?;

        self.runner.run([fasta_path.as_os_str(), out_path.as_os_str()], Some(&dir)).await?;
        let raw = tokio::fs::read(&out_path)
            .await
            .map_err(|e| BackendError::NoOutput(format!("predictions.json: {}", e)))?;
        let predictions: Vec<PlmPrediction> =
            serde_json::from_slice(&raw).map_err(|e| BackendError::parse("PLM predictions", e))?;
        let by_sequence: HashMap<&str, &PlmPrediction> =
            predictions.iter().map(|p| (p.sequence.as_str(), p)).collect();

        let url = self.ctx.structure_url(job_id);
        let mut sites = 0;
        for chain in &sequences {
            let prediction = by_sequence
                .get(chain.sequence.as_str())
                .ok_or_else(|| BackendError::NoOutput(format!("no prediction for chain {}", chain.chain)))?;
            let doc = chain_document(job_id, chain, &map, prediction, self.threshold, &url)?;
            sites += doc.binding_sites.len();
            self.ctx.results.store(job_id, &request.key, &doc).await?;
        }

        info!(job_id = %job_id, chains = sequences.len(), sites, "PLM finished");
        Ok(TaskOutput::done(format!("binding predicted for {} chains", sequences.len())))
    }
}

/// Residues strictly above `threshold` form one site whose confidence is their mean.
pub fn binding_site(
    prediction: &PlmPrediction,
    threshold: f64,
    map: &ChainMap,
    chain: &str,
) -> Result<Option<BindingSite>, BackendError> {
    let len = prediction.sequence.chars().count();
    if prediction.binding.len() != len {
        return Err(BackendError::parse(
            "PLM predictions",
            format!("{} scores for {} residues", prediction.binding.len(), len),
        ));
    }

    let hits: Vec<(usize, f64)> = prediction
        .binding
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, value)| *value > threshold)
        .collect();
    if hits.is_empty() {
        return Ok(None);
    }

    let confidence = hits.iter().map(|(_, v)| v).sum::<f64>() / hits.len() as f64;
    Ok(Some(BindingSite {
        id: PLM_SITE_ID.to_string(),
        confidence: confidence.clamp(0.0, 1.0),
        residues: hits
            .iter()
            .map(|(i, _)| ResidueRef { sequence_index: *i, structure_index: structure_index(map, chain, *i) })
            .collect(),
        rank: None,
        score: None,
    }))
}

fn chain_document(
    job_id: &JobId,
    chain: &ChainSequence,
    map: &ChainMap,
    prediction: &PlmPrediction,
    threshold: f64,
    pdb_url: &str,
) -> Result<ResultDocument, BackendError> {
    ResultDocument::builder(job_id.clone(), &chain.chain, TaskName::Plm.data_source())
        .sequence(&chain.sequence)
        .pdb_url(pdb_url)
        .binding_sites(binding_site(prediction, threshold, map, &chain.chain)?)
        .build()
        .map_err(BackendError::from)
}
