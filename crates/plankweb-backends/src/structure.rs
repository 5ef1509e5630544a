//! PDB-format parsing and sequence extraction.
//!
//! Only the first model is read. Residues are grouped by consecutive
//! (chain, number, insertion code, name).

use plankweb_common::ConvertedSequences;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub name: String,
    pub element: String,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub name: String,
    pub number: i64,
    pub insertion: Option<char>,
    /// From a HETATM record.
    pub hetero: bool,
    pub atoms: Vec<Atom>,
}

impl Residue {
    /// One-letter code if this is an (optionally modified) amino acid.
    pub fn one_letter(&self) -> Option<char> {
        three_to_one(&self.name)
    }

    pub fn is_water(&self) -> bool {
        matches!(self.name.as_str(), "HOH" | "WAT" | "DOD")
    }

    /// A bound small molecule: hetero group that is neither water nor a residue of the chain.
    pub fn is_ligand(&self) -> bool {
        self.hetero && !self.is_water() && self.one_letter().is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub id: String,
    pub residues: Vec<Residue>,
}

impl Chain {
    /// Amino-acid residues in order, paired with their one-letter code.
    pub fn polymer(&self) -> impl Iterator<Item = (&Residue, char)> {
        self.residues.iter().filter_map(|r| r.one_letter().map(|c| (r, c)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    pub chains: Vec<Chain>,
}

impl Structure {
    pub fn chain(&self, id: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == id)
    }

    pub fn ligands(&self) -> impl Iterator<Item = (&Chain, &Residue)> {
        self.chains
            .iter()
            .flat_map(|c| c.residues.iter().filter(|r| r.is_ligand()).map(move |r| (c, r)))
    }
}

/// Parse ATOM/HETATM records of the first model. Malformed lines are skipped.
pub fn parse_pdb(text: &str) -> Structure {
    let mut structure = Structure::default();

    for line in text.lines() {
        if line.starts_with("ENDMDL") {
            break;
        }
        let hetero = line.starts_with("HETATM");
        if !(hetero || line.starts_with("ATOM  ")) {
            continue;
        }
        let Some(record) = parse_atom_line(line) else { continue };

        // Alternate locations: keep the first conformer only.
        if !matches!(record.alt_loc, ' ' | 'A' | '1') {
            continue;
        }

        let existing = structure.chains.iter().position(|c| c.id == record.chain);
        let chain = match existing {
            Some(i) => &mut structure.chains[i],
            None => {
                structure.chains.push(Chain { id: record.chain.clone(), residues: Vec::new() });
                let last = structure.chains.len() - 1;
                &mut structure.chains[last]
            }
        };

        let same_residue = chain.residues.last().is_some_and(|r| {
            r.number == record.number && r.insertion == record.insertion && r.name == record.res_name
        });
        if !same_residue {
            chain.residues.push(Residue {
                name: record.res_name.clone(),
                number: record.number,
                insertion: record.insertion,
                hetero,
                atoms: Vec::new(),
            });
        }
        if let Some(residue) = chain.residues.last_mut() {
            residue.atoms.push(record.atom);
        }
    }

    structure.chains.retain(|c| !c.residues.is_empty());
    structure
}

struct AtomLine {
    alt_loc: char,
    res_name: String,
    chain: String,
    number: i64,
    insertion: Option<char>,
    atom: Atom,
}

fn column(line: &str, start: usize, end: usize) -> Option<&str> {
    line.get(start..end.min(line.len())).map(str::trim)
}

fn parse_atom_line(line: &str) -> Option<AtomLine> {
    let name = column(line, 12, 16)?.to_string();
    let alt_loc = line.get(16..17).and_then(|s| s.chars().next()).unwrap_or(' ');
    let res_name = column(line, 17, 20)?.to_string();
    let chain = column(line, 21, 22).filter(|c| !c.is_empty()).unwrap_or("A").to_string();
    let number: i64 = column(line, 22, 26)?.parse().ok()?;
    let insertion = line.get(26..27).and_then(|s| s.chars().next()).filter(|c| !c.is_whitespace());
    let x: f64 = column(line, 30, 38)?.parse().ok()?;
    let y: f64 = column(line, 38, 46)?.parse().ok()?;
    let z: f64 = column(line, 46, 54)?.parse().ok()?;
    let element = column(line, 76, 78)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| name.chars().filter(|c| c.is_ascii_alphabetic()).take(1).collect());

    Some(AtomLine {
        alt_loc,
        res_name,
        chain,
        number,
        insertion,
        atom: Atom { name, element, position: [x, y, z] },
    })
}

/// Three-letter residue name to one-letter code, including common modified residues.
pub fn three_to_one(name: &str) -> Option<char> {
    let code = match name {
        "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
        "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
        "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
        "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
        "SEC" => 'U', "PYL" => 'O',
        // modified residues
        "MSE" => 'M', "SEP" => 'S', "TPO" => 'T', "PTR" => 'Y', "HYP" => 'P',
        "MLY" => 'K', "M3L" => 'K', "CSO" => 'C', "CSD" => 'C', "CME" => 'C',
        "KCX" => 'K', "LLP" => 'K', "PCA" => 'E', "HIC" => 'H', "CAS" => 'C',
        _ => return None,
    };
    Some(code)
}

/// One sequence per chain, chains with identical sequences grouped.
/// Index mapping is sequence position → residue number.
pub fn extract_sequences(structure: &Structure) -> ConvertedSequences {
    let mut converted = ConvertedSequences::default();
    for chain in &structure.chains {
        let mut sequence = String::new();
        let mut mapping = BTreeMap::new();
        for (i, (residue, code)) in chain.polymer().enumerate() {
            sequence.push(code);
            mapping.insert(i, residue.number);
        }
        if !sequence.is_empty() {
            converted.push_chain(&chain.id, sequence, mapping);
        }
    }
    converted
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chains_and_residues() {
        let structure = parse_pdb(fixtures::TWO_CHAINS);
        assert_eq!(structure.chains.len(), 2);
        let a = structure.chain("A").unwrap();
        assert_eq!(a.residues.len(), 5);
        assert_eq!(a.residues[0].atoms.len(), 2);
        assert_eq!(a.polymer().count(), 3);
        assert_eq!(structure.ligands().count(), 1);
    }

    #[test]
    fn test_identical_chains_are_grouped() {
        let converted = extract_sequences(&parse_pdb(fixtures::TWO_CHAINS));
        assert_eq!(converted.groups.len(), 1);
        assert_eq!(converted.groups[0].sequence, "MKG");
        assert_eq!(converted.groups[0].chains, vec!["A", "B"]);
        assert_eq!(converted.seq_to_str["B"][&0], 10);
    }

    #[test]
    fn test_only_first_model_is_read() {
        let text = "\
MODEL        1
ATOM      1  CA  ALA A   1       0.000   0.000   0.000  1.00  0.00           C
ENDMDL
MODEL        2
ATOM      1  CA  ALA A   1       0.000   0.000   0.000  1.00  0.00           C
ENDMDL
";
        let structure = parse_pdb(text);
        assert_eq!(structure.chain("A").unwrap().residues.len(), 1);
    }

    #[test]
    fn test_modified_residue_counts_as_polymer() {
        let text = "\
ATOM      1  CA  ALA A   1       0.000   0.000   0.000  1.00  0.00           C
HETATM    2  CA  MSE A   2       3.000   0.000   0.000  1.00  0.00           C
";
        let converted = extract_sequences(&parse_pdb(text));
        assert_eq!(converted.groups[0].sequence, "AM");
    }

    #[test]
    fn test_no_protein_gives_empty_conversion() {
        let text = "HETATM    1  O   HOH A   1       0.000   0.000   0.000  1.00  0.00           O\n";
        assert!(extract_sequences(&parse_pdb(text)).is_empty());
        assert!(extract_sequences(&parse_pdb("garbage")).is_empty());
    }
}
