//! PDB structure fetching for similarity-search hits.

use plankweb_common::fetch::FetchClient;
use plankweb_dispatch::BackendError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const RCSB_DOWNLOAD: &str = "https://files.rcsb.org/download";

/// Downloads PDB entries and keeps them in a local cache directory.
#[derive(Debug, Clone)]
pub struct StructureFetcher {
    client: FetchClient,
    cache_dir: PathBuf,
    base_url: String,
}

impl StructureFetcher {
    /// Create a new StructureFetcher with the given cache directory.
    pub fn new<P: AsRef<Path>>(client: FetchClient, cache_dir: P) -> Self {
        Self {
            client,
            cache_dir: cache_dir.as_ref().to_path_buf(),
            base_url: RCSB_DOWNLOAD.to_string(),
        }
    }

    /// Download from a mirror instead of RCSB.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn cache_path(&self, pdb_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.pdb", pdb_id.to_lowercase()))
    }

    /// Fetch a PDB file by its ID, from the cache when present.
    pub async fn fetch_pdb(&self, pdb_id: &str) -> Result<PathBuf, BackendError> {
        if pdb_id.len() != 4 || !pdb_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BackendError::Input(format!("not a PDB id: {:?}", pdb_id)));
        }
        let file_path = self.cache_path(pdb_id);

        if fs::try_exists(&file_path).await? {
            debug!("PDB {} found in cache", pdb_id);
            return Ok(file_path);
        }

        info!("Fetching PDB {} from {}", pdb_id, self.base_url);
        let url = format!("{}/{}.pdb", self.base_url, pdb_id.to_lowercase());
        let response = self
            .client
            .get(&url)?
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BackendError::Fetch(format!("{}: {}", url, e)))?;
        let content = response
            .bytes()
            .await
            .map_err(|e| BackendError::Fetch(format!("{}: {}", url, e)))?;

        fs::create_dir_all(&self.cache_dir).await?;
        plankweb_store::fsutil::write_atomic(&file_path, &content).await?;

        Ok(file_path)
    }

    pub async fn read_pdb(&self, pdb_id: &str) -> Result<String, BackendError> {
        let path = self.fetch_pdb(pdb_id).await?;
        Ok(fs::read_to_string(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fetcher(dir: &Path) -> StructureFetcher {
        // Nothing is allowlisted: any network access fails.
        let client = FetchClient::new(Vec::<String>::new(), std::time::Duration::from_secs(1)).unwrap();
        StructureFetcher::new(client, dir)
    }

    #[tokio::test]
    async fn test_cached_entry_is_served_without_network() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("2src.pdb"), "ATOM\n").unwrap();

        let fetcher = fetcher(dir.path());
        assert_eq!(fetcher.read_pdb("2SRC").await.unwrap(), "ATOM\n");
    }

    #[tokio::test]
    async fn test_uncached_entry_respects_allowlist() {
        let dir = tempdir().unwrap();
        let err = fetcher(dir.path()).fetch_pdb("1crn").await.unwrap_err();
        assert!(matches!(err, BackendError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_rejects_malformed_id() {
        let dir = tempdir().unwrap();
        let err = fetcher(dir.path()).fetch_pdb("../etc").await.unwrap_err();
        assert!(matches!(err, BackendError::Input(_)));
    }
}
