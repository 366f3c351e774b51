use std::io;
use thiserror::Error;

/// Errors surfaced while loading or running an embedding model.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// No model file at the configured path.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The tokenizer JSON is missing.
    #[error("tokenizer missing: {0}")]
    TokenizerMissing(String),
    /// Zero batch size, zero sequence length and the like.
    #[error("invalid semantic config: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// ONNX Runtime, tokenizer, or pooling errors.
    #[error("inference failure: {0}")]
    Inference(String),
}
