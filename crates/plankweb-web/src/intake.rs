//! Job submission body and its validation.

use plankweb_common::ids::normalize_sequence;
pub use plankweb_common::ids::MAX_SEQUENCE_LEN;
use plankweb_common::{Fingerprint, InputMethod, ModelParameters, PocketProfile};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::ApiError;

/// `POST /api/jobs` body, field names as sent by the upload form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub input_method: Option<String>,
    #[serde(default)]
    pub input_protein: Option<String>,
    /// Where the materializer fetches the uploaded or downloaded input.
    #[serde(default)]
    pub input_url: Option<String>,
    #[serde(default)]
    pub use_conservation: bool,
    /// Only honoured for custom structures; other methods imply their model.
    #[serde(default)]
    pub input_model: Option<PocketProfile>,
}

#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub method: InputMethod,
    pub fingerprint: Fingerprint,
    pub input_url: String,
    pub model_parameters: ModelParameters,
}

fn pdb_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9][A-Za-z0-9]{3}$").expect("static regex"))
}

fn uniprot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{6,10}$").expect("static regex"))
}

fn amino_acid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ACDEFGHIKLMNPQRSTVWYUOXBZJ]+$").expect("static regex"))
}

fn bad(msg: impl Into<String>) -> ApiError {
    ApiError::BadRequest(msg.into())
}

pub fn validate(submission: &JobSubmission) -> Result<ValidatedJob, ApiError> {
    let method: InputMethod = submission
        .input_method
        .as_deref()
        .ok_or_else(|| bad("inputMethod field not found"))?
        .parse()?;

    let protein = submission.input_protein.as_deref().map(str::trim).filter(|p| !p.is_empty());
    match (method, protein) {
        (InputMethod::CustomStructure, _) => {}
        (_, None) => return Err(bad(format!("inputProtein is required for {}", method.label()))),
        (InputMethod::Pdb, Some(code)) if !pdb_code_regex().is_match(code) => {
            return Err(bad(format!("invalid PDB code: {}", code)));
        }
        (InputMethod::Uniprot, Some(code)) if !uniprot_regex().is_match(code) => {
            return Err(bad(format!("invalid UniProt accession: {}", code)));
        }
        (InputMethod::Sequence, Some(raw)) => check_sequence(raw)?,
        _ => {}
    }

    let input_url = submission
        .input_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| bad("inputUrl field not found"))?;
    url::Url::parse(input_url).map_err(|e| bad(format!("invalid inputUrl: {}", e)))?;

    let profile = match method {
        InputMethod::Pdb => PocketProfile::Default,
        InputMethod::Uniprot | InputMethod::Sequence => PocketProfile::Alphafold,
        InputMethod::CustomStructure => submission.input_model.unwrap_or_default(),
    };

    Ok(ValidatedJob {
        method,
        fingerprint: Fingerprint::for_input(method, protein)?,
        input_url: input_url.to_string(),
        model_parameters: ModelParameters { conservation: submission.use_conservation, profile },
    })
}

fn check_sequence(raw: &str) -> Result<(), ApiError> {
    let sequence = normalize_sequence(raw);
    if !(1..=MAX_SEQUENCE_LEN).contains(&sequence.len()) {
        return Err(bad(format!(
            "Invalid sequence length: {}, should be in interval [1, {}]",
            sequence.len(),
            MAX_SEQUENCE_LEN
        )));
    }
    if !amino_acid_regex().is_match(&sequence) {
        return Err(bad("Sequence contains characters that are not amino acids"));
    }
    Ok(())
}
