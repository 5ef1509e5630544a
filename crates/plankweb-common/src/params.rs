//! Model parameters and the orchestrator entry payload.

use serde::{Deserialize, Serialize};

use crate::ids::{InputKind, JobId};

/// Which trained pocket model family to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PocketProfile {
    #[default]
    Default,
    /// Predicted structures (AlphaFold, ESMFold).
    Alphafold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default)]
    pub conservation: bool,
    #[serde(default)]
    pub profile: PocketProfile,
}

/// P2Rank model name for a profile, with or without conservation.
pub fn p2rank_model(profile: PocketProfile, conservation: bool) -> &'static str {
    match (profile, conservation) {
        (PocketProfile::Default, false) => "default",
        (PocketProfile::Default, true) => "conservation_hmm",
        (PocketProfile::Alphafold, false) => "alphafold",
        (PocketProfile::Alphafold, true) => "alphafold_conservation_hmm",
    }
}

/// Orchestrator entry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: JobId,
    pub job_existed: bool,
    pub input_kind: InputKind,
    pub input_url: String,
    #[serde(default)]
    pub model_parameters: ModelParameters,
}
