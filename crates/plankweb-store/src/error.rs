//! Storage error types.

use plankweb_common::error::PlankwebError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt store file {0}")]
    Corrupt(String),

    #[error("Invalid document: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<PlankwebError> for StoreError {
    fn from(err: PlankwebError) -> Self {
        StoreError::Validation(err.to_string())
    }
}
