//! Structural similarity search with Foldseek.
//!
//! Each query chain gets a document with the binding sites of its own ligands
//! and, per hit, the ligand sites of the similar PDB chain plus the alignment.

use async_trait::async_trait;
use plankweb_common::result_doc::{AlignmentData, BindingSite, ResultDocument, SimilarProtein};
use plankweb_common::{JobId, TaskName};
use plankweb_dispatch::{AnalysisBackend, BackendError, TaskOutput, TaskRequest};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::annotate::StructureAnnotator;
use crate::context::{BackendContext, ChainSequence};
use crate::pdb::StructureFetcher;
use crate::runner::ToolRunner;
use crate::structure::{parse_pdb, Structure};

pub const FORMAT_OUTPUT: &str = "query,target,alnlen,qseq,qstart,qend,qaln,alntmscore,tseq,tstart,tend,taln";

/// One line of the tab-separated search output.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub query_chain: String,
    pub pdb_id: String,
    pub target_chain: String,
    pub tm_score: f64,
    pub target_sequence: String,
    pub alignment: AlignmentData,
}

pub struct FoldseekBackend {
    runner: ToolRunner,
    database: PathBuf,
    max_seqs: usize,
    fetcher: StructureFetcher,
    annotator: Arc<dyn StructureAnnotator>,
    ctx: BackendContext,
}

impl FoldseekBackend {
    pub fn new(
        runner: ToolRunner,
        database: impl Into<PathBuf>,
        max_seqs: usize,
        fetcher: StructureFetcher,
        annotator: Arc<dyn StructureAnnotator>,
        ctx: BackendContext,
    ) -> Self {
        Self { runner, database: database.into(), max_seqs, fetcher, annotator, ctx }
    }

    /// Ligand sites of the hit chain; `None` when the entry cannot be fetched.
    async fn similar_protein(&self, job_id: &JobId, hit: &SearchHit) -> Option<SimilarProtein> {
        let text = match self.fetcher.read_pdb(&hit.pdb_id).await {
            Ok(text) => text,
            Err(e) => {
                warn!(job_id = %job_id, pdb_id = %hit.pdb_id, "Skipping similar protein: {}", e);
                return None;
            }
        };
        let structure = parse_pdb(&text);
        let sites = sites_within(
            self.annotator.binding_sites(&structure, &hit.target_chain),
            hit.target_sequence.chars().count(),
        );
        Some(SimilarProtein {
            pdb_id: hit.pdb_id.clone(),
            chain: hit.target_chain.clone(),
            sequence: hit.target_sequence.clone(),
            binding_sites: sites,
            alignment_data: hit.alignment.clone(),
        })
    }
}

#[async_trait]
impl AnalysisBackend for FoldseekBackend {
    fn task(&self) -> TaskName {
        TaskName::Foldseek
    }

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError> {
        let job_id = &request.job_id;
        let (_, sequences) = self.ctx.chain_sequences(job_id).await?;
        let (work, input) = self.ctx.stage_structure(job_id, &request.key).await?;

        let out = work.join("aln.m8");
        let tmp = work.join("tmp");
        let max_seqs = self.max_seqs.to_string();
        self.runner
            .run(
                [
                    "easy-search".as_ref(),
                    input.as_os_str(),
                    self.database.as_os_str(),
                    out.as_os_str(),
                    tmp.as_os_str(),
                    "--max-seqs".as_ref(),
                    max_seqs.as_ref(),
                    "--format-output".as_ref(),
                    FORMAT_OUTPUT.as_ref(),
                ] as [&std::ffi::OsStr; 9],
                Some(&work),
            )
            .await?;

        let text = tokio::fs::read_to_string(&out)
            .await
            .map_err(|e| BackendError::NoOutput(format!("search output: {}", e)))?;
        let hits = parse_hits(&text)?;

        let query = parse_pdb(&tokio::fs::read_to_string(&input).await?);
        let url = self.ctx.structure_url(job_id);
        let mut by_chain: BTreeMap<&str, Vec<&SearchHit>> = BTreeMap::new();
        for hit in &hits {
            by_chain.entry(hit.query_chain.as_str()).or_default().push(hit);
        }

        for chain in &sequences {
            let mut similar = Vec::new();
            for hit in by_chain.get(chain.chain.as_str()).into_iter().flatten() {
                if let Some(protein) = self.similar_protein(job_id, hit).await {
                    similar.push(protein);
                }
            }
            let doc = chain_document(job_id, chain, &query, self.annotator.as_ref(), similar, &url)?;
            self.ctx.results.store(job_id, &request.key, &doc).await?;
        }

        info!(job_id = %job_id, hits = hits.len(), chains = sequences.len(), "Foldseek finished");
        Ok(TaskOutput::done(format!("{} similar chains found", hits.len())))
    }
}

fn sites_within(sites: Vec<BindingSite>, len: usize) -> Vec<BindingSite> {
    sites
        .into_iter()
        .filter_map(|mut site| {
            site.residues.retain(|r| r.sequence_index < len);
            (!site.residues.is_empty()).then_some(site)
        })
        .collect()
}

/// Document for one query chain; chains without hits get an empty similar list.
pub fn chain_document(
    job_id: &JobId,
    chain: &ChainSequence,
    query: &Structure,
    annotator: &dyn StructureAnnotator,
    similar: Vec<SimilarProtein>,
    pdb_url: &str,
) -> Result<ResultDocument, BackendError> {
    let own_sites = sites_within(annotator.binding_sites(query, &chain.chain), chain.sequence.chars().count());
    ResultDocument::builder(job_id.clone(), &chain.chain, TaskName::Foldseek.data_source())
        .sequence(&chain.sequence)
        .pdb_url(pdb_url)
        .binding_sites(own_sites)
        .similar_proteins(similar)
        .build()
        .map_err(BackendError::from)
}

fn one_based(field: &str, what: &str) -> Result<usize, BackendError> {
    let n: usize = field.parse().map_err(|e| BackendError::parse(what, e))?;
    n.checked_sub(1).ok_or_else(|| BackendError::parse(what, "position 0 in 1-based column"))
}

/// Parse the tab-separated output produced with [`FORMAT_OUTPUT`].
pub fn parse_hits(text: &str) -> Result<Vec<SearchHit>, BackendError> {
    let mut hits = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 12 {
            return Err(BackendError::parse("search hit", format!("{} columns in {:?}", fields.len(), line)));
        }
        let query = fields[0];
        let query_chain = match query.rsplit_once('_') {
            Some((_, chain)) if !chain.is_empty() => chain.to_string(),
            _ => plankweb_common::chains::SYNTHETIC_CHAIN.to_string(),
        };
        let target = fields[1];
        let pdb_id = target
            .get(..4)
            .ok_or_else(|| BackendError::parse("search target", target))?
            .to_lowercase();
        let target_chain = target
            .split('_')
            .nth(1)
            .ok_or_else(|| BackendError::parse("search target chain", target))?
            .to_string();

        hits.push(SearchHit {
            query_chain,
            pdb_id,
            target_chain,
            tm_score: fields[7].parse().map_err(|e| BackendError::parse("alntmscore", e))?,
            target_sequence: fields[8].to_string(),
            alignment: AlignmentData {
                query_seq_aligned_part_start_idx: one_based(fields[4], "qstart")?,
                query_seq_aligned_part_end_idx: one_based(fields[5], "qend")?,
                query_seq_aligned_part: fields[6].to_string(),
                similar_seq_aligned_part_start_idx: one_based(fields[9], "tstart")?,
                similar_seq_aligned_part_end_idx: one_based(fields[10], "tend")?,
                similar_seq_aligned_part: fields[11].to_string(),
            },
        });
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::ContactAnnotator;
    use crate::structure::fixtures;

    const OUTPUT: &str = "input.pdb_A\t1abc_B\t3\tMKG\t1\t3\tMKG\t0.91\tMKGL\t2\t4\tMKG\n\
input.pdb_A\t2xyz_A\t2\tMKG\t2\t3\tKG\t0.55\tKG\t1\t2\tKG\n";

    #[test]
    fn test_parse_hits() {
        let hits = parse_hits(OUTPUT).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].query_chain, "A");
        assert_eq!(hits[0].pdb_id, "1abc");
        assert_eq!(hits[0].target_chain, "B");
        assert_eq!(hits[0].alignment.query_seq_aligned_part_start_idx, 0);
        assert_eq!(hits[0].alignment.similar_seq_aligned_part_end_idx, 3);
        assert!((hits[1].tm_score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_short_lines_and_zero_positions() {
        assert!(parse_hits("a\tb\tc\n").is_err());
        let zero = OUTPUT.lines().next().unwrap().replacen("\t1\t3\t", "\t0\t3\t", 1);
        assert!(parse_hits(&zero).is_err());
    }

    #[test]
    fn test_chain_document_carries_own_sites_and_hits() {
        let job = JobId::parse("pdb_2src").unwrap();
        let query = parse_pdb(fixtures::TWO_CHAINS);
        let chain = ChainSequence { chain: "A".into(), file: "sequence_1.fasta".into(), sequence: "MKG".into() };
        let hit = &parse_hits(OUTPUT).unwrap()[0];
        let similar = SimilarProtein {
            pdb_id: hit.pdb_id.clone(),
            chain: hit.target_chain.clone(),
            sequence: hit.target_sequence.clone(),
            binding_sites: Vec::new(),
            alignment_data: hit.alignment.clone(),
        };

        let doc = chain_document(&job, &chain, &query, &ContactAnnotator::default(), vec![similar], "u").unwrap();
        assert_eq!(doc.binding_sites.len(), 1);
        assert_eq!(doc.binding_sites[0].id, "ATP_A101");
        assert_eq!(doc.similar_proteins.as_ref().map(Vec::len), Some(1));
        assert_eq!(doc.metadata.data_source, "foldseek");
    }

    #[test]
    fn test_sites_are_clipped_to_sequence() {
        let query = parse_pdb(fixtures::TWO_CHAINS);
        let sites = ContactAnnotator::new(6.0).binding_sites(&query, "A");
        let clipped = sites_within(sites, 1);
        assert_eq!(clipped[0].residues.len(), 1);
        assert!(sites_within(ContactAnnotator::new(6.0).binding_sites(&query, "A"), 0).is_empty());
    }
}
