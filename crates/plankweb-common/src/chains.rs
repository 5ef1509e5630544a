//! Chain map (`chains.json`): which sequence files hold which chains.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PlankwebError, Result};
use crate::fasta;

/// Chain id given to a raw sequence input.
pub const SYNTHETIC_CHAIN: &str = "A";

/// `sequence_<n>.fasta`, 1-based.
pub fn sequence_file_name(n: usize) -> String {
    format!("sequence_{}.fasta", n)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMap {
    pub chains: Vec<String>,
    /// Sequence file name → chains that share that sequence.
    pub fasta: BTreeMap<String, Vec<String>>,
    /// Chain → (sequence index → structure residue number).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seq_to_str_mapping: BTreeMap<String, BTreeMap<usize, i64>>,
}

/// Sequences extracted from a structure, grouped by identical sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvertedSequences {
    pub groups: Vec<SequenceGroup>,
    pub seq_to_str: BTreeMap<String, BTreeMap<usize, i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGroup {
    pub sequence: String,
    pub chains: Vec<String>,
}

impl ConvertedSequences {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.chains.is_empty() || g.sequence.is_empty())
    }

    /// Add a chain, grouping it with an earlier chain of identical sequence.
    pub fn push_chain(&mut self, chain: &str, sequence: String, mapping: BTreeMap<usize, i64>) {
        match self.groups.iter_mut().find(|g| g.sequence == sequence) {
            Some(group) => group.chains.push(chain.to_string()),
            None => self.groups.push(SequenceGroup { sequence, chains: vec![chain.to_string()] }),
        }
        self.seq_to_str.insert(chain.to_string(), mapping);
    }
}

impl ChainMap {
    /// Map for a raw sequence submission: one file, one synthetic chain.
    pub fn single_sequence() -> Self {
        let mut fasta = BTreeMap::new();
        fasta.insert(sequence_file_name(1), vec![SYNTHETIC_CHAIN.to_string()]);
        Self { chains: vec![SYNTHETIC_CHAIN.to_string()], fasta, seq_to_str_mapping: BTreeMap::new() }
    }

    /// Build the map plus the FASTA files to write for a structure conversion.
    pub fn from_conversion(converted: &ConvertedSequences) -> Result<(Self, Vec<(String, String)>)> {
        let mut chains = Vec::new();
        let mut fasta_map = BTreeMap::new();
        let mut files = Vec::new();

        for (i, group) in converted.groups.iter().filter(|g| !g.chains.is_empty()).enumerate() {
            let name = sequence_file_name(i + 1);
            let header = format!("chains {}", group.chains.join(","));
            files.push((name.clone(), fasta::render_record(&header, &group.sequence)));
            fasta_map.insert(name, group.chains.clone());
            chains.extend(group.chains.iter().cloned());
        }

        let map = Self { chains, fasta: fasta_map, seq_to_str_mapping: converted.seq_to_str.clone() };
        map.validate()?;
        Ok((map, files))
    }

    /// The sequence file that holds `chain`.
    pub fn file_for_chain(&self, chain: &str) -> Option<&str> {
        self.fasta
            .iter()
            .find(|(_, chains)| chains.iter().any(|c| c == chain))
            .map(|(name, _)| name.as_str())
    }

    /// Every chain appears exactly once across the sequence files and the
    /// union of those files equals `chains`.
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(PlankwebError::Validation("chain map has no chains".to_string()));
        }
        let declared: BTreeSet<&str> = self.chains.iter().map(String::as_str).collect();
        if declared.len() != self.chains.len() {
            return Err(PlankwebError::Validation("duplicate chain ids in chain map".to_string()));
        }

        let mut seen = BTreeSet::new();
        for (file, chains) in &self.fasta {
            for chain in chains {
                if !seen.insert(chain.as_str()) {
                    return Err(PlankwebError::Validation(format!(
                        "chain {} listed twice (again in {})",
                        chain, file
                    )));
                }
            }
        }
        if seen != declared {
            return Err(PlankwebError::Validation(
                "sequence files do not cover exactly the declared chains".to_string(),
            ));
        }
        Ok(())
    }
}
