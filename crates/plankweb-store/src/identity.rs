//! Fingerprint → job id mapping.

use async_trait::async_trait;
use plankweb_common::{Fingerprint, JobId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::fsutil;

/// Outcome of [`IdentityStore::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub job_id: JobId,
    /// The fingerprint was already mapped before this call.
    pub existed: bool,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Atomically return the job id for `fingerprint`, allocating one if needed.
    async fn get_or_create(&self, fingerprint: &Fingerprint) -> Result<Allocation>;

    /// Read-only lookup; fresh fingerprints never resolve.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<JobId>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IdentityTable {
    counter: u64,
    ids: BTreeMap<String, JobId>,
}

impl IdentityTable {
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<JobId> {
        fingerprint.key().and_then(|key| self.ids.get(&key).cloned())
    }

    /// Mint an id for an unknown fingerprint and remember it when it has a key.
    fn allocate(&mut self, fingerprint: &Fingerprint) -> JobId {
        let job_id = match fingerprint.content_id() {
            Some(id) => id,
            None => {
                self.counter += 1;
                fingerprint.counter_id(self.counter)
            }
        };
        if let Some(key) = fingerprint.key() {
            self.ids.insert(key, job_id.clone());
        }
        job_id
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Process-local store. The mutex is the single serialization point.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    table: Mutex<IdentityTable>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_or_create(&self, fingerprint: &Fingerprint) -> Result<Allocation> {
        let mut table = self.table.lock().await;
        if let Some(job_id) = table.lookup(fingerprint) {
            return Ok(Allocation { job_id, existed: true });
        }
        let job_id = table.allocate(fingerprint);
        debug!(fingerprint = %fingerprint, job_id = %job_id, "Allocated job id");
        Ok(Allocation { job_id, existed: false })
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<JobId>> {
        Ok(self.table.lock().await.lookup(fingerprint))
    }
}

// ── File-backed ───────────────────────────────────────────────────────────────

/// Durable store: the whole table is rewritten atomically before a new
/// allocation is acknowledged.
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
    table: Mutex<IdentityTable>,
}

impl FileIdentityStore {
    /// Open or create the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match fsutil::read_optional(&path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?,
            None => IdentityTable::default(),
        };
        info!("Identity store opened at {:?} ({} known fingerprints)", path, table.ids.len());
        Ok(Self { path, table: Mutex::new(table) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get_or_create(&self, fingerprint: &Fingerprint) -> Result<Allocation> {
        let mut table = self.table.lock().await;
        if let Some(job_id) = table.lookup(fingerprint) {
            return Ok(Allocation { job_id, existed: true });
        }

        let mut next = table.clone();
        let job_id = next.allocate(fingerprint);
        let bytes = serde_json::to_vec_pretty(&next)?;
        fsutil::write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| StoreError::Unavailable(format!("persisting identity table: {}", e)))?;
        *table = next;

        debug!(fingerprint = %fingerprint, job_id = %job_id, "Allocated job id");
        Ok(Allocation { job_id, existed: false })
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<JobId>> {
        Ok(self.table.lock().await.lookup(fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankweb_common::InputMethod;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_fingerprint_yields_one_job() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let fp: Fingerprint = "STRUCTURE:2SRC".parse().unwrap();

        let a = tokio::spawn({
            let (store, fp) = (store.clone(), fp.clone());
            async move { store.get_or_create(&fp).await.unwrap() }
        });
        let b = tokio::spawn({
            let (store, fp) = (store.clone(), fp.clone());
            async move { store.get_or_create(&fp).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a.job_id.as_str(), "structure_2src");
        assert_eq!(a.job_id, b.job_id);
        assert_eq!([a.existed, b.existed].iter().filter(|e| !**e).count(), 1);
    }

    #[tokio::test]
    async fn test_sequence_ids_come_from_counter() {
        let store = InMemoryIdentityStore::new();
        let first = store.get_or_create(&Fingerprint::sequence("MKV").unwrap()).await.unwrap();
        let second = store.get_or_create(&Fingerprint::sequence("GGG").unwrap()).await.unwrap();
        let again = store.get_or_create(&Fingerprint::sequence("mkv").unwrap()).await.unwrap();

        assert_eq!(first.job_id.as_str(), "sequence_1");
        assert_eq!(second.job_id.as_str(), "sequence_2");
        assert_eq!(again, Allocation { job_id: first.job_id, existed: true });
    }

    #[tokio::test]
    async fn test_custom_uploads_never_deduplicate() {
        let store = InMemoryIdentityStore::new();
        let fp = Fingerprint::for_input(InputMethod::CustomStructure, None).unwrap();
        let a = store.get_or_create(&fp).await.unwrap();
        let b = store.get_or_create(&fp).await.unwrap();
        assert_ne!(a.job_id, b.job_id);
        assert!(!a.existed && !b.existed);
        assert!(store.lookup(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let fp = Fingerprint::sequence("MKVLL").unwrap();

        let created = {
            let store = FileIdentityStore::open(&path).await.unwrap();
            store.get_or_create(&Fingerprint::sequence("AAA").unwrap()).await.unwrap();
            store.get_or_create(&fp).await.unwrap()
        };
        assert!(!created.existed);

        let reopened = FileIdentityStore::open(&path).await.unwrap();
        assert_eq!(reopened.lookup(&fp).await.unwrap(), Some(created.job_id.clone()));
        let again = reopened.get_or_create(&fp).await.unwrap();
        assert!(again.existed);

        // Counter continues after reopen.
        let next = reopened.get_or_create(&Fingerprint::sequence("CCC").unwrap()).await.unwrap();
        assert_eq!(next.job_id.as_str(), "sequence_3");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(FileIdentityStore::open(&path).await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_failed_persist_is_unavailable_and_not_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::open(dir.path().join("sub/identity.json")).await.unwrap();
        // Parent "directory" becomes a regular file, so every write fails.
        std::fs::write(dir.path().join("sub"), "x").unwrap();

        let fp: Fingerprint = "pdb:1crn".parse().unwrap();
        assert!(matches!(store.get_or_create(&fp).await, Err(StoreError::Unavailable(_))));
        assert!(store.lookup(&fp).await.unwrap().is_none());
    }
}
