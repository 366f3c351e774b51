use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::device::{default_preference, Device};
use crate::SemanticError;

/// Which embedding implementation backs the model handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local ONNX inference. Requires model and tokenizer files.
    Onnx,
    /// Deterministic character-trigram hashing. For tests and offline demos.
    Stub,
}

/// Runtime configuration describing which model/tokenizer to use and where to run it.
///
/// # Example
/// ```no_run
/// use semantic::{load_embedder, SemanticConfig};
/// use std::path::PathBuf;
///
/// let cfg = SemanticConfig {
///     model_path: PathBuf::from("models/nomic-embed-text-v1.5/onnx/model.onnx"),
///     tokenizer_path: PathBuf::from("models/nomic-embed-text-v1.5/tokenizer.json"),
///     ..Default::default()
/// };
///
/// let embedder = load_embedder(&cfg).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticConfig {
    /// Inference backend selector.
    pub backend: Backend,
    /// Friendly label surfaced in logs.
    pub model_name: String,
    /// Local path to the ONNX file.
    pub model_path: PathBuf,
    /// Path to `tokenizer.json`.
    pub tokenizer_path: PathBuf,
    /// Tokens beyond this length are truncated.
    pub max_sequence_length: usize,
    /// Number of texts per inference call.
    pub batch_size: usize,
    /// Device preference, most preferred first.
    pub device_preference: Vec<Device>,
    /// Output dimension of the stub backend.
    pub stub_dimension: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Onnx,
            model_name: "nomic-embed-text-v1.5".into(),
            model_path: PathBuf::from("./models/nomic-embed-text-v1.5/onnx/model.onnx"),
            tokenizer_path: PathBuf::from("./models/nomic-embed-text-v1.5/tokenizer.json"),
            max_sequence_length: 512,
            batch_size: 32,
            device_preference: default_preference(),
            stub_dimension: 384,
        }
    }
}

impl SemanticConfig {
    /// Config for the deterministic stub backend.
    pub fn stub() -> Self {
        Self {
            backend: Backend::Stub,
            model_name: "stub-trigram".into(),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_device_preference(mut self, preference: Vec<Device>) -> Self {
        self.device_preference = preference;
        self
    }

    pub fn validate(&self) -> Result<(), SemanticError> {
        if self.batch_size == 0 {
            return Err(SemanticError::InvalidConfig(
                "batch_size must be >= 1".into(),
            ));
        }
        if self.max_sequence_length == 0 {
            return Err(SemanticError::InvalidConfig(
                "max_sequence_length must be >= 1".into(),
            ));
        }
        if self.backend == Backend::Stub && self.stub_dimension == 0 {
            return Err(SemanticError::InvalidConfig(
                "stub_dimension must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
