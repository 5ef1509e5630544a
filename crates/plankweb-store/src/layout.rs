//! On-disk layout of the shared artifact root.

use plankweb_common::{JobId, TaskKey};
use std::path::{Path, PathBuf};

pub const STATUS_FILE: &str = "status.json";

/// ```text
/// <root>/inputs/<job>/structure.pdb | sequence_<n>.fasta | chains.json
/// <root>/results/<task>/<job>[/<variant>]/status.json | <chain>_chain_result.json
/// ```
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join("inputs").join(job_id.as_str())
    }

    pub fn input_path(&self, job_id: &JobId, name: &str) -> PathBuf {
        self.input_dir(job_id).join(name)
    }

    pub fn result_dir(&self, job_id: &JobId, key: &TaskKey) -> PathBuf {
        let dir = self.root.join("results").join(key.task.as_str()).join(job_id.as_str());
        match key.variant() {
            Some(variant) => dir.join(variant),
            None => dir,
        }
    }

    pub fn status_path(&self, job_id: &JobId, key: &TaskKey) -> PathBuf {
        self.result_dir(job_id, key).join(STATUS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankweb_common::TaskName;

    #[test]
    fn test_status_path_with_variant() {
        let layout = StoreLayout::new("/data");
        let job = JobId::parse("pdb_2src").unwrap();
        assert_eq!(
            layout.status_path(&job, &TaskKey::with_variant(TaskName::P2Rank, "conservation")),
            PathBuf::from("/data/results/ds_p2rank/pdb_2src/conservation/status.json")
        );
        assert_eq!(
            layout.input_path(&job, "chains.json"),
            PathBuf::from("/data/inputs/pdb_2src/chains.json")
        );
    }
}
