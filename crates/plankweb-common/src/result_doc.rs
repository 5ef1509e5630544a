//! Per-chain result document written by every analysis backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PlankwebError, Result};
use crate::ids::JobId;

/// `<chain>_chain_result.json`
pub fn chain_result_file_name(chain: &str) -> String {
    format!("{}_chain_result.json", chain)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidueRef {
    /// 0-based index into the chain sequence.
    pub sequence_index: usize,
    /// Residue number in the structure, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSite {
    pub id: String,
    pub confidence: f64,
    pub residues: Vec<ResidueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentData {
    pub query_seq_aligned_part_start_idx: usize,
    pub query_seq_aligned_part_end_idx: usize,
    pub query_seq_aligned_part: String,
    pub similar_seq_aligned_part_start_idx: usize,
    pub similar_seq_aligned_part_end_idx: usize,
    pub similar_seq_aligned_part: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarProtein {
    pub pdb_id: String,
    pub chain: String,
    pub sequence: String,
    pub binding_sites: Vec<BindingSite>,
    pub alignment_data: AlignmentData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub data_source: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDocument {
    pub id: JobId,
    pub chain: String,
    pub sequence: String,
    pub pdb_url: String,
    pub binding_sites: Vec<BindingSite>,
    pub metadata: ResultMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_proteins: Option<Vec<SimilarProtein>>,
}

impl ResultDocument {
    pub fn builder(id: JobId, chain: impl Into<String>, data_source: impl Into<String>) -> ResultDocumentBuilder {
        ResultDocumentBuilder {
            id,
            chain: chain.into(),
            data_source: data_source.into(),
            sequence: String::new(),
            pdb_url: String::new(),
            binding_sites: Vec::new(),
            similar_proteins: None,
        }
    }

    /// Shape checks: chain present, confidences in [0, 1], residue indices
    /// inside the sequence, unique binding-site ids.
    pub fn validate(&self) -> Result<()> {
        if self.chain.is_empty() {
            return Err(PlankwebError::Validation("result document without chain".to_string()));
        }
        validate_sites(&self.binding_sites, &self.sequence, &self.chain)?;
        for similar in self.similar_proteins.iter().flatten() {
            validate_sites(&similar.binding_sites, &similar.sequence, &similar.pdb_id)?;
        }
        Ok(())
    }
}

fn validate_sites(sites: &[BindingSite], sequence: &str, owner: &str) -> Result<()> {
    let len = sequence.chars().count();
    let mut ids = HashSet::new();
    for site in sites {
        if !ids.insert(site.id.as_str()) {
            return Err(PlankwebError::Validation(format!("{}: duplicate binding site {}", owner, site.id)));
        }
        if !site.confidence.is_finite() || !(0.0..=1.0).contains(&site.confidence) {
            return Err(PlankwebError::Validation(format!(
                "{}: binding site {} confidence {} out of range",
                owner, site.id, site.confidence
            )));
        }
        if let Some(bad) = site.residues.iter().find(|r| r.sequence_index >= len) {
            return Err(PlankwebError::Validation(format!(
                "{}: binding site {} residue {} beyond sequence length {}",
                owner, site.id, bad.sequence_index, len
            )));
        }
    }
    Ok(())
}

/// Builder; `build` stamps the timestamp and validates.
pub struct ResultDocumentBuilder {
    id: JobId,
    chain: String,
    data_source: String,
    sequence: String,
    pdb_url: String,
    binding_sites: Vec<BindingSite>,
    similar_proteins: Option<Vec<SimilarProtein>>,
}

impl ResultDocumentBuilder {
    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = sequence.into();
        self
    }

    pub fn pdb_url(mut self, url: impl Into<String>) -> Self {
        self.pdb_url = url.into();
        self
    }

    pub fn binding_site(mut self, site: BindingSite) -> Self {
        self.binding_sites.push(site);
        self
    }

    pub fn binding_sites(mut self, sites: impl IntoIterator<Item = BindingSite>) -> Self {
        self.binding_sites.extend(sites);
        self
    }

    pub fn similar_proteins(mut self, similar: Vec<SimilarProtein>) -> Self {
        self.similar_proteins = Some(similar);
        self
    }

    pub fn build(self) -> Result<ResultDocument> {
        let doc = ResultDocument {
            id: self.id,
            chain: self.chain,
            sequence: self.sequence,
            pdb_url: self.pdb_url,
            binding_sites: self.binding_sites,
            metadata: ResultMetadata { data_source: self.data_source, timestamp: Utc::now() },
            similar_proteins: self.similar_proteins,
        };
        doc.validate()?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: &str, confidence: f64, indices: &[usize]) -> BindingSite {
        BindingSite {
            id: id.to_string(),
            confidence,
            residues: indices.iter().map(|&i| ResidueRef { sequence_index: i, structure_index: Some(i as i64 + 1) }).collect(),
            rank: None,
            score: None,
        }
    }

    #[test]
    fn test_builder_produces_camel_case_document() {
        let doc = ResultDocument::builder(JobId::parse("pdb_2src").unwrap(), "A", "p2rank")
            .sequence("MKVLL")
            .pdb_url("http://localhost/inputs/pdb_2src/structure.pdb")
            .binding_site(site("pocket1", 0.8, &[0, 2]))
            .build()
            .unwrap();

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["bindingSites"][0]["residues"][1]["sequenceIndex"], 2);
        assert_eq!(json["bindingSites"][0]["residues"][1]["structureIndex"], 3);
        assert_eq!(json["metadata"]["dataSource"], "p2rank");
        assert!(json.get("similarProteins").is_none());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let result = ResultDocument::builder(JobId::parse("x").unwrap(), "A", "plm")
            .sequence("MKV")
            .binding_site(site("pocket_plm", 1.5, &[0]))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_residue_beyond_sequence_rejected() {
        let result = ResultDocument::builder(JobId::parse("x").unwrap(), "A", "plm")
            .sequence("MKV")
            .binding_site(site("pocket_plm", 0.5, &[3]))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_site_ids_rejected() {
        let result = ResultDocument::builder(JobId::parse("x").unwrap(), "A", "p2rank")
            .sequence("MKV")
            .binding_sites([site("pocket1", 0.5, &[0]), site("pocket1", 0.4, &[1])])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_chain_result_file_name() {
        assert_eq!(chain_result_file_name("B"), "B_chain_result.json");
    }
}
