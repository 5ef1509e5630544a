//! Input Materializer: canonical job inputs in the artifact store.
//!
//! Every write is write-if-absent, so re-entrant runs only fill in what is
//! missing. The chain map is written last; its presence marks a complete
//! sequence set.

use plankweb_common::chains::sequence_file_name;
use plankweb_common::fasta;
use plankweb_common::fetch::InputSource;
use plankweb_common::ids::{normalize_sequence, MAX_SEQUENCE_LEN};
use plankweb_common::{ChainMap, ConvertedSequences, JobId};
use plankweb_store::artifacts::{CHAINS_FILE, STRUCTURE_FILE};
use plankweb_store::ArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{MaterializeError, Result};

const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWYUOXBZJ";

pub struct InputMaterializer {
    artifacts: Arc<ArtifactStore>,
    source: Arc<dyn InputSource>,
}

impl InputMaterializer {
    pub fn new(artifacts: Arc<ArtifactStore>, source: Arc<dyn InputSource>) -> Self {
        Self { artifacts, source }
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.source
            .fetch(url)
            .await
            .map_err(|source| MaterializeError::Fetch { url: url.to_string(), source })
    }

    /// Structure file for the job, fetched from `url` unless already present.
    pub async fn ensure_structure(&self, job_id: &JobId, url: &str) -> Result<PathBuf> {
        let path = self.artifacts.input_path(job_id, STRUCTURE_FILE);
        if self.artifacts.has_input(job_id, STRUCTURE_FILE).await? {
            debug!(job_id = %job_id, "Structure already materialized");
            return Ok(path);
        }

        let bytes = self.fetch(url).await?;
        let text = String::from_utf8_lossy(&bytes);
        if !text.lines().any(|l| l.starts_with("ATOM") || l.starts_with("HETATM")) {
            return Err(MaterializeError::InvalidInput(format!("{} is not a PDB structure", url)));
        }
        self.artifacts.write_input_if_absent(job_id, STRUCTURE_FILE, &bytes).await?;
        info!(job_id = %job_id, url = %url, "Structure materialized");
        Ok(path)
    }

    /// Sequence file plus single-chain map for a raw sequence submission.
    pub async fn ensure_sequence_set(&self, job_id: &JobId, url: &str) -> Result<ChainMap> {
        if self.artifacts.has_input(job_id, CHAINS_FILE).await? {
            debug!(job_id = %job_id, "Sequence set already materialized");
            return Ok(self.artifacts.read_chain_map(job_id).await?);
        }

        let bytes = self.fetch(url).await?;
        let text = String::from_utf8_lossy(&bytes);
        let sequence = match fasta::first_sequence(&text) {
            Some(sequence) => sequence,
            None => normalize_sequence(&text),
        };
        validate_sequence(&sequence)?;

        let map = ChainMap::single_sequence();
        let file = sequence_file_name(1);
        let record = fasta::render_record(job_id.as_str(), &sequence);
        self.artifacts.write_input_if_absent(job_id, &file, record.as_bytes()).await?;
        self.artifacts.write_chain_map_if_absent(job_id, &map).await?;
        info!(job_id = %job_id, residues = sequence.len(), "Sequence set materialized");
        Ok(map)
    }

    /// Persist the output of sequence → structure conversion.
    pub async fn store_converted_structure(&self, job_id: &JobId, pdb: &str) -> Result<PathBuf> {
        if pdb.trim().is_empty() {
            return Err(MaterializeError::InvalidInput("empty converted structure".to_string()));
        }
        self.artifacts.write_input_if_absent(job_id, STRUCTURE_FILE, pdb.as_bytes()).await?;
        Ok(self.artifacts.input_path(job_id, STRUCTURE_FILE))
    }

    /// Persist the output of structure → sequence conversion: one FASTA per
    /// distinct sequence in first-seen order, then the chain map.
    pub async fn store_converted_sequences(&self, job_id: &JobId, converted: &ConvertedSequences) -> Result<ChainMap> {
        if converted.is_empty() {
            return Err(MaterializeError::InvalidInput("conversion produced no sequences".to_string()));
        }
        let (map, files) = ChainMap::from_conversion(converted)?;
        for (name, text) in &files {
            self.artifacts.write_input_if_absent(job_id, name, text.as_bytes()).await?;
        }
        if !self.artifacts.write_chain_map_if_absent(job_id, &map).await? {
            // A concurrent run got there first; its map is the canonical one.
            return Ok(self.artifacts.read_chain_map(job_id).await?);
        }
        info!(job_id = %job_id, chains = map.chains.len(), files = files.len(), "Sequence set stored");
        Ok(map)
    }

    pub async fn inputs_complete(&self, job_id: &JobId) -> Result<bool> {
        Ok(self.artifacts.inputs_complete(job_id).await?)
    }

    pub async fn has_structure(&self, job_id: &JobId) -> Result<bool> {
        Ok(self.artifacts.has_input(job_id, STRUCTURE_FILE).await?)
    }

    pub async fn has_chain_map(&self, job_id: &JobId) -> Result<bool> {
        Ok(self.artifacts.has_input(job_id, CHAINS_FILE).await?)
    }
}

fn validate_sequence(sequence: &str) -> Result<()> {
    if sequence.is_empty() {
        return Err(MaterializeError::InvalidInput("empty sequence".to_string()));
    }
    if sequence.len() > MAX_SEQUENCE_LEN {
        return Err(MaterializeError::InvalidInput(format!(
            "sequence has {} residues, at most {} are accepted",
            sequence.len(),
            MAX_SEQUENCE_LEN
        )));
    }
    if let Some(bad) = sequence.chars().find(|c| !AMINO_ACIDS.contains(*c)) {
        return Err(MaterializeError::InvalidInput(format!("unexpected residue {:?}", bad)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankweb_store::StoreLayout;
    use plankweb_test_utils::{job, StaticSource, TWO_CHAIN_PDB};

    fn materializer(dir: &tempfile::TempDir, source: StaticSource) -> (InputMaterializer, Arc<StaticSource>) {
        let source = Arc::new(source);
        let artifacts = Arc::new(ArtifactStore::new(StoreLayout::new(dir.path()), "http://test/data"));
        (InputMaterializer::new(artifacts, source.clone()), source)
    }

    #[tokio::test]
    async fn test_sequence_set_for_raw_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = materializer(&dir, StaticSource::new().with("mem://seq", "mkv lta\n"));
        let id = job("sequence_1");

        let map = m.ensure_sequence_set(&id, "mem://seq").await.unwrap();
        assert_eq!(map, ChainMap::single_sequence());
        let text = m.artifacts().read_input_string(&id, "sequence_1.fasta").await.unwrap();
        assert_eq!(fasta::first_sequence(&text).as_deref(), Some("MKVLTA"));
    }

    #[tokio::test]
    async fn test_existing_inputs_are_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let (m, source) = materializer(&dir, StaticSource::new().with("mem://pdb", TWO_CHAIN_PDB));
        let id = job("pdb_2src");

        m.ensure_structure(&id, "mem://pdb").await.unwrap();
        m.ensure_structure(&id, "mem://pdb").await.unwrap();
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = materializer(&dir, StaticSource::new());
        let err = m.ensure_structure(&job("pdb_2src"), "mem://missing").await.unwrap_err();
        assert!(matches!(err, MaterializeError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_rejects_non_structure_and_bad_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new().with("mem://html", "<html>404</html>").with("mem://seq", "MKV1");
        let (m, _) = materializer(&dir, source);

        assert!(matches!(
            m.ensure_structure(&job("pdb_2src"), "mem://html").await,
            Err(MaterializeError::InvalidInput(_))
        ));
        assert!(matches!(
            m.ensure_sequence_set(&job("sequence_1"), "mem://seq").await,
            Err(MaterializeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_fetched_sequence_length_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new()
            .with("mem://long", format!(">long\n{}\n", "A".repeat(MAX_SEQUENCE_LEN + 1)))
            .with("mem://max", "A".repeat(MAX_SEQUENCE_LEN));
        let (m, _) = materializer(&dir, source);

        match m.ensure_sequence_set(&job("sequence_2"), "mem://long").await {
            Err(MaterializeError::InvalidInput(message)) => assert!(message.contains("401 residues")),
            other => panic!("expected an invalid input, got {:?}", other),
        }
        assert!(!m.has_chain_map(&job("sequence_2")).await.unwrap());
        assert!(m.ensure_sequence_set(&job("sequence_3"), "mem://max").await.is_ok());
    }

    #[tokio::test]
    async fn test_converted_sequences_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = materializer(&dir, StaticSource::new());
        let id = job("pdb_1abc");

        let mut converted = ConvertedSequences::default();
        converted.push_chain("B", "GGG".into(), Default::default());
        converted.push_chain("A", "MKV".into(), Default::default());
        converted.push_chain("C", "GGG".into(), Default::default());

        let map = m.store_converted_sequences(&id, &converted).await.unwrap();
        assert_eq!(map.fasta["sequence_1.fasta"], vec!["B", "C"]);
        assert_eq!(map.fasta["sequence_2.fasta"], vec!["A"]);
        assert_eq!(m.artifacts().read_chain_map(&id).await.unwrap(), map);
    }
}
