use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors raised by the index and matrix cache.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-d vectors, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Blob on disk is not a valid index/matrix file for this build.
    #[error("corrupt index file: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode blob: {0}")]
    Encode(String),
    #[error("failed to decode blob: {0}")]
    Decode(String),
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}
