use plankweb_common::error::PlankwebError;
use plankweb_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MaterializeError>;

/// Why canonical inputs could not be produced. Never raised past the
/// orchestrator; it becomes the `materialize` status record.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: PlankwebError,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Common(#[from] PlankwebError),
}
