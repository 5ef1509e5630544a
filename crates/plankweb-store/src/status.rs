//! Per-task status records.

use async_trait::async_trait;
use plankweb_common::{JobId, StatusRecord, TaskKey};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;
use crate::fsutil;
use crate::layout::StoreLayout;

#[async_trait]
pub trait StatusTracker: Send + Sync {
    /// Overwrite the record for `(job_id, key)`.
    async fn write(&self, job_id: &JobId, key: &TaskKey, record: &StatusRecord) -> Result<()>;

    /// `Ok(None)` means the task was never started.
    async fn read(&self, job_id: &JobId, key: &TaskKey) -> Result<Option<StatusRecord>>;
}

/// Read a record, treating any read failure as "not started yet".
pub async fn read_or_absent(tracker: &dyn StatusTracker, job_id: &JobId, key: &TaskKey) -> Option<StatusRecord> {
    match tracker.read(job_id, key).await {
        Ok(record) => record,
        Err(e) => {
            warn!(job_id = %job_id, task = %key, "Status read failed, treating as absent: {}", e);
            None
        }
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryStatusTracker {
    records: RwLock<HashMap<(JobId, TaskKey), StatusRecord>>,
}

impl InMemoryStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record of one job, sorted by task key.
    pub async fn records_for(&self, job_id: &JobId) -> Vec<(TaskKey, StatusRecord)> {
        let mut out: Vec<_> = self
            .records
            .read()
            .await
            .iter()
            .filter(|((job, _), _)| job == job_id)
            .map(|((_, key), record)| (key.clone(), record.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[async_trait]
impl StatusTracker for InMemoryStatusTracker {
    async fn write(&self, job_id: &JobId, key: &TaskKey, record: &StatusRecord) -> Result<()> {
        self.records.write().await.insert((job_id.clone(), key.clone()), record.clone());
        Ok(())
    }

    async fn read(&self, job_id: &JobId, key: &TaskKey) -> Result<Option<StatusRecord>> {
        Ok(self.records.read().await.get(&(job_id.clone(), key.clone())).cloned())
    }
}

// ── Filesystem ────────────────────────────────────────────────────────────────

/// `results/<task>/<job>[/<variant>]/status.json`, replaced atomically.
#[derive(Debug, Clone)]
pub struct FsStatusTracker {
    layout: StoreLayout,
}

impl FsStatusTracker {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl StatusTracker for FsStatusTracker {
    async fn write(&self, job_id: &JobId, key: &TaskKey, record: &StatusRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        fsutil::write_atomic(&self.layout.status_path(job_id, key), &bytes).await?;
        Ok(())
    }

    async fn read(&self, job_id: &JobId, key: &TaskKey) -> Result<Option<StatusRecord>> {
        let path = self.layout.status_path(job_id, key);
        let Some(bytes) = fsutil::read_optional(&path).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(job_id = %job_id, task = %key, "Unparsable status record at {:?}: {}", path, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankweb_common::{TaskName, TaskStatus};

    fn job() -> JobId {
        JobId::parse("pdb_2src").unwrap()
    }

    #[tokio::test]
    async fn test_fs_tracker_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FsStatusTracker::new(StoreLayout::new(dir.path()));
        let key = TaskKey::new(TaskName::Foldseek);

        assert!(tracker.read(&job(), &key).await.unwrap().is_none());
        tracker.write(&job(), &key, &StatusRecord::started("queued")).await.unwrap();
        tracker.write(&job(), &key, &StatusRecord::completed("done")).await.unwrap();

        let record = tracker.read(&job(), &key).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.info_message, "done");
    }

    #[tokio::test]
    async fn test_fs_tracker_variant_is_separate_record() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FsStatusTracker::new(StoreLayout::new(dir.path()));
        let plain = TaskKey::new(TaskName::P2Rank);
        let variant = TaskKey::with_variant(TaskName::P2Rank, "conservation");

        tracker.write(&job(), &plain, &StatusRecord::completed("")).await.unwrap();
        assert!(tracker.read(&job(), &variant).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_torn_record_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let key = TaskKey::new(TaskName::Plm);
        let path = layout.status_path(&job(), &key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"status": 1, "infoMe"#).unwrap();

        let tracker = FsStatusTracker::new(layout);
        assert!(tracker.read(&job(), &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_tracker_writes_integer_status() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let tracker = FsStatusTracker::new(layout.clone());
        let key = TaskKey::new(TaskName::Conservation);
        tracker.write(&job(), &key, &StatusRecord::failed("hmmer crashed")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(layout.status_path(&job(), &key)).unwrap()).unwrap();
        assert_eq!(raw["status"], 2);
        assert_eq!(raw["errorMessage"], "hmmer crashed");
    }

    #[tokio::test]
    async fn test_in_memory_records_for_job() {
        let tracker = InMemoryStatusTracker::new();
        tracker.write(&job(), &TaskKey::new(TaskName::Plm), &StatusRecord::started("")).await.unwrap();
        tracker
            .write(&JobId::parse("other").unwrap(), &TaskKey::new(TaskName::Plm), &StatusRecord::started(""))
            .await
            .unwrap();
        assert_eq!(tracker.records_for(&job()).await.len(), 1);
        assert!(read_or_absent(&tracker, &job(), &TaskKey::new(TaskName::Foldseek)).await.is_none());
    }
}
