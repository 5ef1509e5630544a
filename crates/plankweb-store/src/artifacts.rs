//! Shared artifact store: canonical inputs and backend result directories.

use plankweb_common::chains::{sequence_file_name, ChainMap};
use plankweb_common::{JobId, TaskKey};
use std::path::PathBuf;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::fsutil;
use crate::layout::StoreLayout;

pub const STRUCTURE_FILE: &str = "structure.pdb";
pub const CHAINS_FILE: &str = "chains.json";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: StoreLayout,
    public_url: String,
}

impl ArtifactStore {
    /// `public_url` is where the artifact root is served from.
    pub fn new(layout: StoreLayout, public_url: impl Into<String>) -> Self {
        let public_url = public_url.into().trim_end_matches('/').to_string();
        Self { layout, public_url }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Public URL of an input file, used as `pdbUrl` in result documents.
    pub fn input_url(&self, job_id: &JobId, name: &str) -> String {
        format!("{}/inputs/{}/{}", self.public_url, job_id, name)
    }

    pub fn input_path(&self, job_id: &JobId, name: &str) -> PathBuf {
        self.layout.input_path(job_id, name)
    }

    pub async fn has_input(&self, job_id: &JobId, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.layout.input_path(job_id, name)).await?)
    }

    /// Structure, first sequence file and chain map are all present.
    pub async fn inputs_complete(&self, job_id: &JobId) -> Result<bool> {
        let first_sequence = sequence_file_name(1);
        for name in [STRUCTURE_FILE, first_sequence.as_str(), CHAINS_FILE] {
            if !self.has_input(job_id, name).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns whether the file was written (false: it already existed).
    pub async fn write_input_if_absent(&self, job_id: &JobId, name: &str, bytes: &[u8]) -> Result<bool> {
        let written = fsutil::write_if_absent(&self.layout.input_path(job_id, name), bytes).await?;
        debug!(job_id = %job_id, file = name, written, "write-if-absent");
        Ok(written)
    }

    pub async fn read_input(&self, job_id: &JobId, name: &str) -> Result<Vec<u8>> {
        fsutil::read_optional(&self.layout.input_path(job_id, name))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", job_id, name)))
    }

    pub async fn read_input_string(&self, job_id: &JobId, name: &str) -> Result<String> {
        let bytes = self.read_input(job_id, name).await?;
        String::from_utf8(bytes).map_err(|_| StoreError::Corrupt(format!("{}/{} is not UTF-8", job_id, name)))
    }

    pub async fn read_chain_map(&self, job_id: &JobId) -> Result<ChainMap> {
        let bytes = self.read_input(job_id, CHAINS_FILE).await?;
        let map: ChainMap = serde_json::from_slice(&bytes)?;
        map.validate()?;
        Ok(map)
    }

    /// The chain map is immutable once written.
    pub async fn write_chain_map_if_absent(&self, job_id: &JobId, map: &ChainMap) -> Result<bool> {
        map.validate()?;
        let bytes = serde_json::to_vec_pretty(map)?;
        self.write_input_if_absent(job_id, CHAINS_FILE, &bytes).await
    }

    pub fn result_dir(&self, job_id: &JobId, key: &TaskKey) -> PathBuf {
        self.layout.result_dir(job_id, key)
    }

    /// Create the result directory for a task run and return it.
    pub async fn ensure_result_dir(&self, job_id: &JobId, key: &TaskKey) -> Result<PathBuf> {
        let dir = self.layout.result_dir(job_id, key);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}
