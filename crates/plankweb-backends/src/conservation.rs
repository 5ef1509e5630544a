//! Per-residue conservation scores, one run per distinct sequence.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use plankweb_common::{JobId, TaskName};
use plankweb_dispatch::{AnalysisBackend, BackendError, TaskOutput, TaskRequest};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::context::BackendContext;
use crate::runner::ToolRunner;

/// Score file staged next to the P2Rank input for `chain`.
pub fn hom_file_name(chain: &str) -> String {
    format!("input{}.hom", chain)
}

pub struct ConservationBackend {
    runner: ToolRunner,
    ctx: BackendContext,
}

impl ConservationBackend {
    pub fn new(runner: ToolRunner, ctx: BackendContext) -> Self {
        Self { runner, ctx }
    }

    async fn score_file(
        &self,
        job_id: &JobId,
        out_dir: &Path,
        file: &str,
        chains: &[String],
    ) -> Result<usize, BackendError> {
        let fasta = self.ctx.artifacts.input_path(job_id, file);
        let stem = file.trim_end_matches(".fasta");
        let scores = out_dir.join(format!("{}.hom", stem));

        self.runner.run([fasta.as_os_str(), scores.as_os_str()], Some(out_dir)).await?;
        if !tokio::fs::try_exists(&scores).await? {
            return Err(BackendError::NoOutput(format!("{} produced no scores for {}", self.runner.name(), file)));
        }

        for chain in chains {
            tokio::fs::copy(&scores, out_dir.join(hom_file_name(chain))).await?;
            debug!(job_id = %job_id, chain = %chain, "Staged conservation scores");
        }
        Ok(chains.len())
    }
}

#[async_trait]
impl AnalysisBackend for ConservationBackend {
    fn task(&self) -> TaskName {
        TaskName::Conservation
    }

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError> {
        let job_id = &request.job_id;
        let map = self.ctx.chain_map(job_id).await?;
        let out_dir: PathBuf = self.ctx.artifacts.ensure_result_dir(job_id, &request.key).await?;

        let runs = map
            .fasta
            .iter()
            .map(|(file, chains)| self.score_file(job_id, &out_dir, file, chains));
        let chains: usize = try_join_all(runs).await?.into_iter().sum();

        info!(job_id = %job_id, files = map.fasta.len(), chains, "Conservation scored");
        Ok(TaskOutput::done(format!("conservation scored for {} chains", chains)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use plankweb_common::chains::ChainMap;
    use plankweb_store::{ArtifactStore, StoreLayout};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("score.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn job_with_two_chain_groups(ctx: &BackendContext) -> JobId {
        let job = JobId::parse("pdb_1abc").unwrap();
        let mut converted = plankweb_common::ConvertedSequences::default();
        converted.push_chain("A", "MKV".into(), Default::default());
        converted.push_chain("B", "MKV".into(), Default::default());
        converted.push_chain("C", "GGG".into(), Default::default());
        let (map, files) = ChainMap::from_conversion(&converted).unwrap();
        for (name, text) in files {
            ctx.artifacts.write_input_if_absent(&job, &name, text.as_bytes()).await.unwrap();
        }
        ctx.artifacts.write_chain_map_if_absent(&job, &map).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_scores_are_staged_per_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BackendContext::new(Arc::new(ArtifactStore::new(StoreLayout::new(dir.path().join("data")), "u")));
        let job = job_with_two_chain_groups(&ctx).await;
        let exe = script(dir.path(), "echo \"0 0.5 M\" > \"$2\"");

        let backend = ConservationBackend::new(ToolRunner::new("conservation", exe), ctx.clone());
        let output = backend.run(&TaskRequest::new(job.clone(), TaskName::Conservation)).await.unwrap();
        assert_eq!(output.summary(), "conservation scored for 3 chains");

        let out = ctx.artifacts.result_dir(&job, &TaskName::Conservation.into());
        for chain in ["A", "B", "C"] {
            assert!(out.join(hom_file_name(chain)).exists(), "missing scores for {}", chain);
        }
    }

    #[tokio::test]
    async fn test_tool_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BackendContext::new(Arc::new(ArtifactStore::new(StoreLayout::new(dir.path().join("data")), "u")));
        let job = job_with_two_chain_groups(&ctx).await;
        let exe = script(dir.path(), "exit 0");

        let backend = ConservationBackend::new(ToolRunner::new("conservation", exe), ctx);
        let err = backend.run(&TaskRequest::new(job, TaskName::Conservation)).await.unwrap_err();
        assert!(matches!(err, BackendError::NoOutput(_)));
    }
}
