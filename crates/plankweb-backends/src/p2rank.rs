//! Binding pocket prediction using P2Rank.

use async_trait::async_trait;
use plankweb_common::params::p2rank_model;
use plankweb_common::result_doc::{BindingSite, ResidueRef, ResultDocument};
use plankweb_common::{ChainMap, JobId, PocketProfile, TaskName};
use plankweb_dispatch::{AnalysisBackend, BackendError, TaskOutput, TaskRequest};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::context::{sequence_indices, BackendContext, ChainSequence};
use crate::conservation::hom_file_name;
use crate::runner::ToolRunner;

const RESIDUES_CSV: &str = "input.pdb_residues.csv";
const PREDICTIONS_CSV: &str = "input.pdb_predictions.csv";

/// One row of `*_predictions.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct PocketPrediction {
    pub name: String,
    pub rank: u32,
    pub score: f64,
    pub probability: f64,
}

/// One row of `*_residues.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueAssignment {
    pub chain: String,
    /// Residue number; insertion codes are dropped.
    pub number: i64,
    /// 0 means the residue is in no pocket.
    pub pocket: u32,
}

pub struct P2RankBackend {
    runner: ToolRunner,
    ctx: BackendContext,
    profile: PocketProfile,
}

impl P2RankBackend {
    pub fn new(runner: ToolRunner, ctx: BackendContext, profile: PocketProfile) -> Self {
        Self { runner, ctx, profile }
    }

    async fn stage_conservation(&self, job_id: &JobId, map: &ChainMap, work: &Path) -> Result<(), BackendError> {
        let source = self.ctx.artifacts.result_dir(job_id, &TaskName::Conservation.into());
        for chain in &map.chains {
            let name = hom_file_name(chain);
            let from = source.join(&name);
            if !tokio::fs::try_exists(&from).await? {
                return Err(BackendError::Input(format!("conservation scores missing for chain {}", chain)));
            }
            tokio::fs::copy(&from, work.join(&name)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AnalysisBackend for P2RankBackend {
    fn task(&self) -> TaskName {
        TaskName::P2Rank
    }

    async fn run(&self, request: &TaskRequest) -> Result<TaskOutput, BackendError> {
        let job_id = &request.job_id;
        let (map, sequences) = self.ctx.chain_sequences(job_id).await?;
        let (work, input) = self.ctx.stage_structure(job_id, &request.key).await?;

        let conservation = request.args.use_conservation;
        if conservation {
            self.stage_conservation(job_id, &map, &work).await?;
        }
        let model = request
            .args
            .model
            .clone()
            .unwrap_or_else(|| p2rank_model(self.profile, conservation).to_string());

        let out_dir = work.join("out");
        self.runner
            .run(
                [
                    "predict".as_ref(),
                    "-f".as_ref(),
                    input.as_os_str(),
                    "-o".as_ref(),
                    out_dir.as_os_str(),
                    "-c".as_ref(),
                    model.as_ref(),
                    "-visualizations".as_ref(),
                    "0".as_ref(),
                ] as [&std::ffi::OsStr; 9],
                Some(&work),
            )
            .await?;

        let residues_csv = read_output(&out_dir, RESIDUES_CSV).await?;
        let predictions_csv = read_output(&out_dir, PREDICTIONS_CSV).await?;
        let predictions = parse_predictions(&predictions_csv)?;
        let residues = parse_residues(&residues_csv)?;

        let url = self.ctx.structure_url(job_id);
        for chain in &sequences {
            let doc = build_chain_document(job_id, chain, &map, &predictions, &residues, &url)?;
            self.ctx.results.store(job_id, &request.key, &doc).await?;
        }

        info!(job_id = %job_id, task = %request.key, model = %model, pockets = predictions.len(), "P2Rank finished");
        Ok(TaskOutput::done(format!("{} pockets predicted with model {}", predictions.len(), model)))
    }
}

async fn read_output(dir: &Path, name: &str) -> Result<String, BackendError> {
    tokio::fs::read_to_string(dir.join(name))
        .await
        .map_err(|e| BackendError::NoOutput(format!("{}: {}", name, e)))
}

fn csv_rows(text: &str) -> impl Iterator<Item = Vec<&str>> {
    text.lines().skip(1).filter(|l| !l.trim().is_empty()).map(|l| l.split(',').map(str::trim).collect())
}

/// `name, rank, score, probability, ...`
pub fn parse_predictions(text: &str) -> Result<Vec<PocketPrediction>, BackendError> {
    csv_rows(text)
        .map(|row| {
            if row.len() < 4 {
                return Err(BackendError::parse("predictions", format!("short row {:?}", row)));
            }
            Ok(PocketPrediction {
                name: row[0].to_string(),
                rank: row[1].parse().map_err(|e| BackendError::parse("pocket rank", e))?,
                score: row[2].parse().map_err(|e| BackendError::parse("pocket score", e))?,
                probability: row[3].parse().map_err(|e| BackendError::parse("pocket probability", e))?,
            })
        })
        .collect()
}

/// `chain, residue_label, residue_name, score, zscore, probability, pocket`
pub fn parse_residues(text: &str) -> Result<Vec<ResidueAssignment>, BackendError> {
    csv_rows(text)
        .map(|row| {
            if row.len() < 7 {
                return Err(BackendError::parse("residues", format!("short row {:?}", row)));
            }
            let label = row[1];
            let digits: String = label
                .chars()
                .enumerate()
                .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
                .map(|(_, c)| c)
                .collect();
            Ok(ResidueAssignment {
                chain: row[0].to_string(),
                number: digits.parse().map_err(|e| BackendError::parse("residue label", e))?,
                pocket: row[6].parse().map_err(|e| BackendError::parse("residue pocket", e))?,
            })
        })
        .collect()
}

/// Pockets touching `chain`, most probable first.
pub fn build_chain_document(
    job_id: &JobId,
    chain: &ChainSequence,
    map: &ChainMap,
    predictions: &[PocketPrediction],
    residues: &[ResidueAssignment],
    pdb_url: &str,
) -> Result<ResultDocument, BackendError> {
    let seq_len = chain.sequence.chars().count();
    let index_of = sequence_indices(map, &chain.chain, seq_len);

    let mut members: BTreeMap<u32, Vec<ResidueRef>> = BTreeMap::new();
    for residue in residues.iter().filter(|r| r.chain == chain.chain && r.pocket > 0) {
        match index_of.get(&residue.number) {
            Some(&i) if i < seq_len => members.entry(residue.pocket).or_default().push(ResidueRef {
                sequence_index: i,
                structure_index: Some(residue.number),
            }),
            _ => debug!(chain = %chain.chain, residue = residue.number, "Residue outside chain sequence"),
        }
    }

    let mut sites: Vec<BindingSite> = predictions
        .iter()
        .filter_map(|p| {
            let residues = members.remove(&p.rank)?;
            Some(BindingSite {
                id: format!("pocket{}", p.rank),
                confidence: p.probability.clamp(0.0, 1.0),
                residues,
                rank: Some(p.rank),
                score: Some(p.score),
            })
        })
        .collect();
    sites.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    ResultDocument::builder(job_id.clone(), &chain.chain, TaskName::P2Rank.data_source())
        .sequence(&chain.sequence)
        .pdb_url(pdb_url)
        .binding_sites(sites)
        .build()
        .map_err(BackendError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREDICTIONS: &str = "\
name     ,rank, score, probability, sas_points, surf_atoms, center_x, center_y, center_z, residue_ids, surf_atom_ids
pocket1  ,   1, 12.50,       0.612,         80,         40,   10.0,   10.0,   10.0, A_1 A_2, 1 2
pocket2  ,   2,  3.10,       0.835,         20,         10,   40.0,   10.0,   10.0, A_3 B_10, 3 5
";

    const RESIDUES: &str = "\
chain, residue_label, residue_name, score, zscore, probability, pocket
A,  1, MET, 1.0, 0.5, 0.40, 1
A,  2, LYS, 1.0, 0.5, 0.40, 1
A,  3, GLY, 1.0, 0.5, 0.40, 2
B, 10, MET, 1.0, 0.5, 0.40, 2
B, 11, LYS, 0.0, 0.0, 0.01, 0
";

    fn chain_map() -> ChainMap {
        let mut converted = plankweb_common::ConvertedSequences::default();
        converted.push_chain("A", "MKG".into(), BTreeMap::from([(0, 1), (1, 2), (2, 3)]));
        converted.push_chain("B", "MKG".into(), BTreeMap::from([(0, 10), (1, 11), (2, 12)]));
        ChainMap::from_conversion(&converted).unwrap().0
    }

    fn chain(id: &str) -> ChainSequence {
        ChainSequence { chain: id.into(), file: "sequence_1.fasta".into(), sequence: "MKG".into() }
    }

    #[test]
    fn test_parse_csvs() {
        let predictions = parse_predictions(PREDICTIONS).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[1].rank, 2);
        assert!((predictions[1].probability - 0.835).abs() < 1e-9);

        let residues = parse_residues(RESIDUES).unwrap();
        assert_eq!(residues.len(), 5);
        assert_eq!(residues[3], ResidueAssignment { chain: "B".into(), number: 10, pocket: 2 });
    }

    #[test]
    fn test_chain_documents_sorted_by_probability() {
        let job = JobId::parse("pdb_2src").unwrap();
        let predictions = parse_predictions(PREDICTIONS).unwrap();
        let residues = parse_residues(RESIDUES).unwrap();

        let a = build_chain_document(&job, &chain("A"), &chain_map(), &predictions, &residues, "u").unwrap();
        assert_eq!(a.binding_sites.len(), 2);
        assert_eq!(a.binding_sites[0].id, "pocket2");
        assert_eq!(a.binding_sites[1].residues.len(), 2);
        assert_eq!(a.metadata.data_source, "p2rank");

        let b = build_chain_document(&job, &chain("B"), &chain_map(), &predictions, &residues, "u").unwrap();
        assert_eq!(b.binding_sites.len(), 1);
        assert_eq!(b.binding_sites[0].residues[0].sequence_index, 0);
        assert_eq!(b.binding_sites[0].residues[0].structure_index, Some(10));
    }

    #[test]
    fn test_insertion_codes_are_dropped() {
        let residues = parse_residues("h\nA, 52A, GLY, 0, 0, 0, 1\n").unwrap();
        assert_eq!(residues[0].number, 52);
    }

    #[test]
    fn test_short_row_is_parse_error() {
        assert!(matches!(parse_predictions("h\npocket1, 1\n"), Err(BackendError::Parse { .. })));
    }
}
