//! YAML configuration file support.
//!
//! One file configures the search engine, the extraction pipeline and
//! logging. Every section is optional and falls back to its defaults.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//!
//! engine:
//!   embedding_cache_path: "./cache/embeddings.bin"
//!   index_cache_path: "./cache/abstracts.index"
//!   semantic:
//!     backend: "onnx"
//!     model_name: "nomic-embed-text-v1.5"
//!     model_path: "./models/nomic-embed-text-v1.5/onnx/model.onnx"
//!     tokenizer_path: "./models/nomic-embed-text-v1.5/tokenizer.json"
//!     batch_size: 32
//!     device_preference: ["mps", "cuda", "cpu"]
//!
//! extraction:
//!   batch_size: 20
//!   max_concurrent: 5
//!   retry:
//!     max_retries: 3
//!     base_delay: 5000
//!   rate_limit:
//!     max_requests: 14
//!     window: 60000
//!   gemini:
//!     model: "gemini-2.5-flash"
//!     api_key_env: "GEMINI_API_KEY"
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```

use std::fs;
use std::path::Path;

use extract::ExtractionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineConfig;

/// Errors that can occur when loading a YAML configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub version: String,
    pub engine: EngineConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            engine: EngineConfig::default(),
            extraction: ExtractionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }

        self.engine
            .semantic
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("engine.semantic: {e}")))?;
        if self.engine.embedding_cache_path == self.engine.index_cache_path {
            return Err(ConfigLoadError::Validation(
                "engine.embedding_cache_path and engine.index_cache_path must differ".into(),
            ));
        }
        self.extraction
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("extraction: {e}")))?;
        self.logging.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".into(),
            ));
        }
        Ok(())
    }
}
