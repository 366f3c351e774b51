//! Batched remote keyphrase extraction.
//!
//! A corpus is cut into fixed-size batches; each batch becomes one structured
//! call to a remote model asking for keyphrases per document. Calls go through
//! three layers:
//!
//! 1. a counting gate limiting how many batches are in flight,
//! 2. a shared [`SlidingWindowLimiter`] bounding requests per minute,
//! 3. a retry loop with exponential backoff for rate-limit and overload errors.
//!
//! Failures stay local to their batch. A run always yields an
//! [`ExtractionReport`] with one row per document; rows of failed batches are
//! `None`.
//!
//! ## Example
//!
//! ```no_run
//! use extract::{ExtractionConfig, ExtractionPipeline, GeminiClient, SlidingWindowLimiter};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), extract::ExtractError> {
//! let cfg = ExtractionConfig::default();
//! let client = Arc::new(GeminiClient::from_env(cfg.gemini.clone())?);
//! let limiter = Arc::new(SlidingWindowLimiter::new(cfg.rate_limit));
//! let pipeline = ExtractionPipeline::new(client, limiter, &cfg)?;
//!
//! let docs = vec!["We study graph neural networks for molecule property prediction.".to_string()];
//! let report = pipeline.process_all(&docs).await;
//! println!("{:?}", report.rows[0]);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod retry;
mod serde_millis;

pub use batch::{extract_batch, BatchContext, BatchOutcome};
pub use client::{ExtractionClient, GeminiClient};
pub use config::{ExtractionConfig, GeminiConfig, PromptConfig, RateLimitConfig, RetryConfig};
pub use error::{ClientError, ExtractError};
pub use pipeline::{load_annotations, AnnotatedDocument, ExtractionPipeline, ExtractionReport};
pub use prompt::{annotation_key, ExtractionRequest};
pub use rate_limit::{RateLimitStats, SlidingWindowLimiter};
pub use retry::{ErrorClass, ErrorClassifier, StatusAwareClassifier, SubstringClassifier};
