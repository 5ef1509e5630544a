//! Job identities, input methods and fingerprints.
//!
//! A fingerprint is the normalized identity of a submitted input. It decides
//! both the deduplication key and how a fresh job id is minted:
//!
//! | method            | key                      | id                     |
//! |-------------------|--------------------------|------------------------|
//! | PDB accession     | `pdb:2src`               | `pdb_2src`             |
//! | UniProt accession | `uniprot:p69905`         | `uniprot_p69905`       |
//! | raw sequence      | `sequence:MKV...`        | `sequence_<hex count>` |
//! | custom upload     | never stored             | `custom_str_<hex>`     |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PlankwebError, Result};

// ── Job id ────────────────────────────────────────────────────────────────────

/// Opaque job identifier. Always safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Validate an externally supplied id (URL path segment, queue payload).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > 128 {
            return Err(PlankwebError::InvalidInput(format!("invalid job id length: {}", raw.len())));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(PlankwebError::InvalidInput(format!("invalid job id: {}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Input kind / method ───────────────────────────────────────────────────────

/// Which entry point of the orchestrator handles a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKind {
    #[serde(rename = "STR")]
    Structure,
    #[serde(rename = "SEQ")]
    Sequence,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Structure => f.write_str("STR"),
            InputKind::Sequence => f.write_str("SEQ"),
        }
    }
}

/// How a user submitted the protein.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InputMethod {
    Pdb,
    CustomStructure,
    Uniprot,
    Sequence,
}

impl InputMethod {
    /// Single-digit code used by the upload form.
    pub fn code(self) -> char {
        match self {
            InputMethod::Pdb => '0',
            InputMethod::CustomStructure => '1',
            InputMethod::Uniprot => '2',
            InputMethod::Sequence => '3',
        }
    }

    /// Lowercase label, used as fingerprint kind and job id prefix.
    pub fn label(self) -> &'static str {
        match self {
            InputMethod::Pdb => "pdb",
            InputMethod::CustomStructure => "custom_str",
            InputMethod::Uniprot => "uniprot",
            InputMethod::Sequence => "sequence",
        }
    }

    pub fn input_kind(self) -> InputKind {
        match self {
            InputMethod::Sequence => InputKind::Sequence,
            _ => InputKind::Structure,
        }
    }
}

impl FromStr for InputMethod {
    type Err = PlankwebError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "pdb" => Ok(InputMethod::Pdb),
            "1" | "custom_str" | "custom" => Ok(InputMethod::CustomStructure),
            "2" | "uniprot" => Ok(InputMethod::Uniprot),
            "3" | "sequence" | "seq" => Ok(InputMethod::Sequence),
            other => Err(PlankwebError::InvalidInput(format!("unknown input method: {}", other))),
        }
    }
}

impl TryFrom<String> for InputMethod {
    type Error = PlankwebError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InputMethod> for String {
    fn from(value: InputMethod) -> Self {
        value.label().to_string()
    }
}

// ── Fingerprint ───────────────────────────────────────────────────────────────

/// Kinds whose ids come from a counter; an accession of these kinds would
/// mint ids in the counter's namespace.
const COUNTER_KINDS: [&str; 3] = ["sequence", "custom_str", "custom_seq"];

/// Longest raw sequence accepted as job input.
pub const MAX_SEQUENCE_LEN: usize = 400;

/// How a job id is allocated for a fingerprint that has not been seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// `{kind}_{value}`; the value is already a short accession.
    ContentDerived,
    /// `{kind}_{hex counter}`; the mapping is stored for deduplication.
    Counter,
    /// `{kind}_{hex counter}`; never stored, every submission is a new job.
    Fresh,
}

/// Normalized identity of an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    kind: String,
    value: Option<String>,
    strategy: IdStrategy,
}

impl Fingerprint {
    /// Accession-style fingerprint, e.g. `("STRUCTURE", "2SRC")` → `structure:2src`.
    pub fn accession(kind: &str, accession: &str) -> Result<Self> {
        let kind = normalize_token(kind, "kind")?;
        if COUNTER_KINDS.contains(&kind.as_str()) {
            return Err(PlankwebError::InvalidInput(format!("{} is not an accession kind", kind)));
        }
        let value = normalize_token(accession, "accession")?;
        Ok(Self { kind, value: Some(value), strategy: IdStrategy::ContentDerived })
    }

    /// Raw amino-acid sequence. The sequence itself is the key; ids come from the counter.
    pub fn sequence(raw: &str) -> Result<Self> {
        let seq = normalize_sequence(raw);
        if seq.is_empty() {
            return Err(PlankwebError::InvalidInput("empty sequence".to_string()));
        }
        Ok(Self {
            kind: InputMethod::Sequence.label().to_string(),
            value: Some(seq),
            strategy: IdStrategy::Counter,
        })
    }

    /// Opaque upload; never deduplicated.
    pub fn fresh(kind: &str) -> Result<Self> {
        Ok(Self { kind: normalize_token(kind, "kind")?, value: None, strategy: IdStrategy::Fresh })
    }

    /// Build the fingerprint for an upload-form submission.
    pub fn for_input(method: InputMethod, protein: Option<&str>) -> Result<Self> {
        let protein = protein.map(str::trim).filter(|p| !p.is_empty());
        match method {
            InputMethod::CustomStructure => Self::fresh(method.label()),
            InputMethod::Sequence => {
                let raw = protein.ok_or_else(|| PlankwebError::InvalidInput("missing sequence".to_string()))?;
                Self::sequence(raw)
            }
            InputMethod::Pdb | InputMethod::Uniprot => {
                let code = protein.ok_or_else(|| {
                    PlankwebError::InvalidInput(format!("missing {} accession", method.label()))
                })?;
                Self::accession(method.label(), code)
            }
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    /// Deduplication key, `None` for fresh fingerprints.
    pub fn key(&self) -> Option<String> {
        match (&self.value, self.strategy) {
            (_, IdStrategy::Fresh) | (None, _) => None,
            (Some(value), _) => Some(format!("{}:{}", self.kind, value)),
        }
    }

    /// Id derived from the fingerprint alone, if the strategy allows it.
    pub fn content_id(&self) -> Option<JobId> {
        match (&self.value, self.strategy) {
            (Some(value), IdStrategy::ContentDerived) => Some(JobId(format!("{}_{}", self.kind, value))),
            _ => None,
        }
    }

    /// Id minted from a counter value.
    pub fn counter_id(&self, counter: u64) -> JobId {
        JobId(format!("{}_{:x}", self.kind, counter))
    }
}

impl FromStr for Fingerprint {
    type Err = PlankwebError;

    /// Parses `KIND:VALUE`. Upload kinds are rejected: they have no value to parse.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| PlankwebError::InvalidInput(format!("fingerprint without kind: {}", s)))?;
        if kind.trim().eq_ignore_ascii_case(InputMethod::Sequence.label()) {
            Self::sequence(value)
        } else {
            Self::accession(kind, value)
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key() {
            Some(key) => f.write_str(key),
            None => write!(f, "{}:<fresh>", self.kind),
        }
    }
}

fn normalize_token(raw: &str, what: &str) -> Result<String> {
    let token = raw.trim().to_ascii_lowercase();
    if token.is_empty() {
        return Err(PlankwebError::InvalidInput(format!("empty {}", what)));
    }
    if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(PlankwebError::InvalidInput(format!("invalid {}: {}", what, raw.trim())));
    }
    Ok(token)
}

/// Strip FASTA headers and whitespace, uppercase the residues.
pub fn normalize_sequence(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
