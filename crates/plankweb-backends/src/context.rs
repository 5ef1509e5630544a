//! Shared access to job inputs and result storage for every backend.

use plankweb_common::fasta;
use plankweb_common::{ChainMap, JobId, TaskKey};
use plankweb_dispatch::BackendError;
use plankweb_store::artifacts::STRUCTURE_FILE;
use plankweb_store::{ArtifactStore, ResultAggregator, StoreError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::structure::{extract_sequences, parse_pdb};

/// Sequence of one chain as recorded in the chain map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSequence {
    pub chain: String,
    pub file: String,
    pub sequence: String,
}

#[derive(Debug, Clone)]
pub struct BackendContext {
    pub artifacts: Arc<ArtifactStore>,
    pub results: Arc<ResultAggregator>,
}

impl BackendContext {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        let results = Arc::new(ResultAggregator::new(artifacts.clone()));
        Self { artifacts, results }
    }

    pub async fn chain_map(&self, job_id: &JobId) -> Result<ChainMap, BackendError> {
        self.artifacts
            .read_chain_map(job_id)
            .await
            .map_err(|e| BackendError::Input(format!("chain map: {}", e)))
    }

    /// Every chain with its sequence, in chain-map order.
    ///
    /// Structure-native backends of the first wave can run before the chain
    /// map exists; they then derive the chains from the structure itself, the
    /// same way structure → sequence conversion does.
    pub async fn chain_sequences(&self, job_id: &JobId) -> Result<(ChainMap, Vec<ChainSequence>), BackendError> {
        let (map, by_file) = match self.artifacts.read_chain_map(job_id).await {
            Ok(map) => {
                let mut by_file = HashMap::new();
                for file in map.fasta.keys() {
                    let text = self
                        .artifacts
                        .read_input_string(job_id, file)
                        .await
                        .map_err(|e| BackendError::Input(format!("{}: {}", file, e)))?;
                    let sequence = fasta::first_sequence(&text)
                        .ok_or_else(|| BackendError::Input(format!("{} holds no sequence", file)))?;
                    by_file.insert(file.clone(), sequence);
                }
                (map, by_file)
            }
            Err(StoreError::NotFound(_)) => self.chains_from_structure(job_id).await?,
            Err(e) => return Err(BackendError::Input(format!("chain map: {}", e))),
        };

        let mut out = Vec::new();
        for chain in &map.chains {
            let file = map
                .file_for_chain(chain)
                .ok_or_else(|| BackendError::Input(format!("chain {} has no sequence file", chain)))?;
            out.push(ChainSequence {
                chain: chain.clone(),
                file: file.to_string(),
                sequence: by_file[file].clone(),
            });
        }
        Ok((map, out))
    }

    async fn chains_from_structure(
        &self,
        job_id: &JobId,
    ) -> Result<(ChainMap, HashMap<String, String>), BackendError> {
        let text = self
            .artifacts
            .read_input_string(job_id, STRUCTURE_FILE)
            .await
            .map_err(|e| BackendError::Input(format!("no chain map and no structure: {}", e)))?;
        let converted = extract_sequences(&parse_pdb(&text));
        if converted.is_empty() {
            return Err(BackendError::Input("structure contains no protein chains".to_string()));
        }
        let (map, files) = ChainMap::from_conversion(&converted)?;
        debug!(job_id = %job_id, chains = map.chains.len(), "Chains derived from structure");

        let by_file = files
            .iter()
            .zip(converted.groups.iter().filter(|g| !g.chains.is_empty()))
            .map(|((name, _), group)| (name.clone(), group.sequence.clone()))
            .collect();
        Ok((map, by_file))
    }

    /// Copy the job structure into a fresh working directory as `input.pdb`.
    pub async fn stage_structure(&self, job_id: &JobId, key: &TaskKey) -> Result<(PathBuf, PathBuf), BackendError> {
        let work = self.artifacts.ensure_result_dir(job_id, key).await?.join("work");
        if tokio::fs::try_exists(&work).await? {
            tokio::fs::remove_dir_all(&work).await?;
        }
        tokio::fs::create_dir_all(&work).await?;

        let source = self.artifacts.input_path(job_id, STRUCTURE_FILE);
        if !tokio::fs::try_exists(&source).await? {
            return Err(BackendError::Input(format!("{} has no structure", job_id)));
        }
        let input = work.join("input.pdb");
        tokio::fs::copy(&source, &input).await?;
        Ok((work, input))
    }

    pub fn structure_url(&self, job_id: &JobId) -> String {
        self.artifacts.input_url(job_id, STRUCTURE_FILE)
    }
}

/// Structure residue number for a sequence index; falls back to `index + 1`
/// when the map carries no mapping for the chain (predicted structures).
pub fn structure_index(map: &ChainMap, chain: &str, sequence_index: usize) -> Option<i64> {
    match map.seq_to_str_mapping.get(chain) {
        Some(mapping) => mapping.get(&sequence_index).copied(),
        None => Some(sequence_index as i64 + 1),
    }
}

/// Reverse of [`structure_index`] for one chain.
pub fn sequence_indices(map: &ChainMap, chain: &str, sequence_len: usize) -> HashMap<i64, usize> {
    match map.seq_to_str_mapping.get(chain) {
        Some(mapping) => mapping.iter().map(|(seq, structure)| (*structure, *seq)).collect(),
        None => (0..sequence_len).map(|i| (i as i64 + 1, i)).collect(),
    }
}
