//! plankweb-common: Shared types, errors, and traits used across all PlankWeb crates.

pub mod error;
pub mod ids;
pub mod status;
pub mod chains;
pub mod fasta;
pub mod result_doc;
pub mod params;
pub mod fetch;

// Re-export commonly used types
pub use ids::{Fingerprint, IdStrategy, InputKind, InputMethod, JobId};
pub use status::{StatusRecord, TaskKey, TaskName, TaskStatus};
pub use chains::{ChainMap, ConvertedSequences, SequenceGroup};
pub use params::{JobPayload, ModelParameters, PocketProfile};
