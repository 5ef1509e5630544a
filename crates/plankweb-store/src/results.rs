//! Result aggregation: validated per-chain documents, one directory per backend run.

use plankweb_common::result_doc::{chain_result_file_name, ResultDocument};
use plankweb_common::status::CONSERVATION_VARIANT;
use plankweb_common::{JobId, StatusRecord, TaskKey, TaskName};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::artifacts::ArtifactStore;
use crate::error::{Result, StoreError};
use crate::fsutil;
use crate::status::{read_or_absent, StatusTracker};

const RESULT_SUFFIX: &str = "_chain_result.json";

/// Every task key a job can have a record for.
pub fn tracked_keys() -> Vec<TaskKey> {
    let mut keys: Vec<TaskKey> = TaskName::BACKENDS.iter().copied().map(TaskKey::new).collect();
    keys.push(TaskKey::with_variant(TaskName::P2Rank, CONSERVATION_VARIANT));
    keys.push(TaskKey::new(TaskName::Materialize));
    keys
}

/// Status plus available chains of one task run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverview {
    pub task: TaskKey,
    pub status: Option<StatusRecord>,
    pub chains: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResultAggregator {
    artifacts: Arc<ArtifactStore>,
}

impl ResultAggregator {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }

    /// Validate and write `<chain>_chain_result.json` for a task run.
    pub async fn store(&self, job_id: &JobId, key: &TaskKey, doc: &ResultDocument) -> Result<PathBuf> {
        if &doc.id != job_id {
            return Err(StoreError::Validation(format!("document id {} does not match job {}", doc.id, job_id)));
        }
        doc.validate()?;

        let path = self.artifacts.result_dir(job_id, key).join(chain_result_file_name(&doc.chain));
        fsutil::write_atomic(&path, &serde_json::to_vec_pretty(doc)?).await?;
        debug!(job_id = %job_id, task = %key, chain = %doc.chain, "Stored chain result");
        Ok(path)
    }

    pub async fn load(&self, job_id: &JobId, key: &TaskKey, chain: &str) -> Result<Option<ResultDocument>> {
        let path = self.artifacts.result_dir(job_id, key).join(chain_result_file_name(chain));
        match fsutil::read_optional(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Chains that have a stored document for this run, sorted.
    pub async fn chains(&self, job_id: &JobId, key: &TaskKey) -> Result<Vec<String>> {
        let dir = self.artifacts.result_dir(job_id, key);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chains = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(chain) = name.strip_suffix(RESULT_SUFFIX) {
                chains.push(chain.to_string());
            }
        }
        chains.sort();
        Ok(chains)
    }

    /// Status and chains for every tracked task of a job.
    pub async fn overview(&self, job_id: &JobId, tracker: &dyn StatusTracker) -> Result<Vec<TaskOverview>> {
        let mut out = Vec::new();
        for key in tracked_keys() {
            let status = read_or_absent(tracker, job_id, &key).await;
            let chains = self.chains(job_id, &key).await?;
            out.push(TaskOverview { task: key, status, chains });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StoreLayout;
    use crate::status::InMemoryStatusTracker;
    use plankweb_common::result_doc::{BindingSite, ResidueRef};

    fn aggregator(dir: &tempfile::TempDir) -> ResultAggregator {
        ResultAggregator::new(Arc::new(ArtifactStore::new(StoreLayout::new(dir.path()), "http://x")))
    }

    fn doc(job: &JobId, chain: &str, confidence: f64) -> ResultDocument {
        ResultDocument {
            id: job.clone(),
            chain: chain.to_string(),
            sequence: "MKVLL".to_string(),
            pdb_url: String::new(),
            binding_sites: vec![BindingSite {
                id: "pocket1".to_string(),
                confidence,
                residues: vec![ResidueRef { sequence_index: 1, structure_index: Some(2) }],
                rank: Some(1),
                score: Some(3.2),
            }],
            metadata: plankweb_common::result_doc::ResultMetadata {
                data_source: "p2rank".to_string(),
                timestamp: chrono::Utc::now(),
            },
            similar_proteins: None,
        }
    }

    #[tokio::test]
    async fn test_store_and_list_chains() {
        let dir = tempfile::tempdir().unwrap();
        let results = aggregator(&dir);
        let job = JobId::parse("pdb_2src").unwrap();
        let key = TaskKey::new(TaskName::P2Rank);

        results.store(&job, &key, &doc(&job, "B", 0.4)).await.unwrap();
        results.store(&job, &key, &doc(&job, "A", 0.9)).await.unwrap();

        assert_eq!(results.chains(&job, &key).await.unwrap(), vec!["A", "B"]);
        let loaded = results.load(&job, &key, "A").await.unwrap().unwrap();
        assert_eq!(loaded.binding_sites[0].confidence, 0.9);
        assert!(results.load(&job, &key, "C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let results = aggregator(&dir);
        let job = JobId::parse("pdb_2src").unwrap();
        let err = results.store(&job, &TaskKey::new(TaskName::P2Rank), &doc(&job, "A", 2.0)).await;
        assert!(matches!(err, Err(StoreError::Validation(_))));

        let other = JobId::parse("pdb_1crn").unwrap();
        let err = results.store(&job, &TaskKey::new(TaskName::P2Rank), &doc(&other, "A", 0.5)).await;
        assert!(matches!(err, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_overview_lists_every_tracked_key() {
        let dir = tempfile::tempdir().unwrap();
        let results = aggregator(&dir);
        let tracker = InMemoryStatusTracker::new();
        let job = JobId::parse("pdb_2src").unwrap();
        tracker.write(&job, &TaskKey::new(TaskName::Foldseek), &StatusRecord::completed("")).await.unwrap();

        let overview = results.overview(&job, &tracker).await.unwrap();
        assert_eq!(overview.len(), tracked_keys().len());
        let foldseek = overview.iter().find(|o| o.task.task == TaskName::Foldseek).unwrap();
        assert!(foldseek.status.is_some());
        assert!(overview.iter().any(|o| o.task.variant() == Some(CONSERVATION_VARIANT)));
    }
}
