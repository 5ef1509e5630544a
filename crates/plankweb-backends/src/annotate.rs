//! Binding-site annotation of known structures.
//!
//! Similarity-search hits are reported with the binding sites of the hit
//! structure. [`ContactAnnotator`] derives them from the bound ligands: every
//! polymer residue of the chain with an atom within the cutoff of a ligand atom
//! belongs to that ligand's site.

use plankweb_common::result_doc::{BindingSite, ResidueRef};

use crate::structure::{Atom, Chain, Structure};

pub trait StructureAnnotator: Send + Sync {
    /// Binding sites on `chain` with indices into that chain's polymer sequence.
    fn binding_sites(&self, structure: &Structure, chain: &str) -> Vec<BindingSite>;
}

#[derive(Debug, Clone)]
pub struct ContactAnnotator {
    cutoff: f64,
}

impl ContactAnnotator {
    /// `cutoff` in Ångström.
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }
}

impl Default for ContactAnnotator {
    fn default() -> Self {
        Self::new(5.0)
    }
}

fn distance_sq(a: &Atom, b: &Atom) -> f64 {
    a.position.iter().zip(b.position.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl StructureAnnotator for ContactAnnotator {
    fn binding_sites(&self, structure: &Structure, chain_id: &str) -> Vec<BindingSite> {
        let Some(chain) = structure.chain(chain_id) else {
            return Vec::new();
        };
        let cutoff_sq = self.cutoff * self.cutoff;

        let mut sites = Vec::new();
        for (ligand_chain, ligand) in structure.ligands() {
            let residues: Vec<ResidueRef> = chain
                .polymer()
                .enumerate()
                .filter(|(_, (residue, _))| {
                    residue
                        .atoms
                        .iter()
                        .any(|a| ligand.atoms.iter().any(|l| distance_sq(a, l) <= cutoff_sq))
                })
                .map(|(i, (residue, _))| ResidueRef { sequence_index: i, structure_index: Some(residue.number) })
                .collect();
            if residues.is_empty() {
                continue;
            }
            let id = format!("{}_{}{}", ligand.name, ligand_chain.id, ligand.number);
            if sites.iter().any(|s: &BindingSite| s.id == id) {
                continue;
            }
            sites.push(BindingSite { id, confidence: 1.0, residues, rank: None, score: None });
        }
        sites
    }
}

/// Polymer sequence of a chain as one-letter codes.
pub fn chain_sequence(chain: &Chain) -> String {
    chain.polymer().map(|(_, code)| code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{fixtures, parse_pdb};

    #[test]
    fn test_ligand_contacts_form_a_site() {
        let structure = parse_pdb(fixtures::TWO_CHAINS);
        let sites = ContactAnnotator::default().binding_sites(&structure, "A");

        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].id, "ATP_A101");
        assert_eq!(sites[0].confidence, 1.0);
        // ATP at x=12: MET 1 (x=10/11) and LYS 2 (x=14) within 5 Å, GLY 3 (x=17) at exactly 5.385.
        let indices: Vec<usize> = sites[0].residues.iter().map(|r| r.sequence_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_distant_chain_and_unknown_chain_have_no_sites() {
        let structure = parse_pdb(fixtures::TWO_CHAINS);
        let annotator = ContactAnnotator::default();
        assert!(annotator.binding_sites(&structure, "B").is_empty());
        assert!(annotator.binding_sites(&structure, "Z").is_empty());
    }

    #[test]
    fn test_larger_cutoff_reaches_more_residues() {
        let structure = parse_pdb(fixtures::TWO_CHAINS);
        let sites = ContactAnnotator::new(6.0).binding_sites(&structure, "A");
        assert_eq!(sites[0].residues.len(), 3);
    }

    #[test]
    fn test_chain_sequence() {
        let structure = parse_pdb(fixtures::TWO_CHAINS);
        assert_eq!(chain_sequence(structure.chain("B").unwrap()), "MKG");
    }
}
