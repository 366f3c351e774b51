use std::io;
use thiserror::Error;

/// Failure of a single remote call.
///
/// These never escape a batch job; they are classified and either retried or
/// turned into an empty batch result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ClientError {
    /// HTTP status when the provider answered with one.
    pub status: Option<u16>,
    pub message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Error for a non-success HTTP answer. The message keeps the code so
    /// substring classification still works on it.
    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        Self {
            status: Some(status),
            message: format!("HTTP {status}: {}", body.as_ref()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Errors raised while setting up or persisting an extraction run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid extraction config: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// HTTP client could not be constructed.
    #[error("client setup failed: {0}")]
    Client(String),
}
