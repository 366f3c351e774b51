//! Sentence embedding models for retrieval.
//!
//! This crate turns text into dense vectors. It knows how to pick a compute
//! device, load a local ONNX model plus its `tokenizer.json`, and apply the
//! asymmetric task prefixes that retrieval-tuned models (nomic-embed and
//! friends) expect: documents and queries are embedded with different
//! leading strings, and mixing them up quietly wrecks ranking quality.
//!
//! Two backends:
//!
//! - **ONNX** - real inference. Missing model files are an error, not a
//!   fallback.
//! - **Stub** - deterministic trigram hashing. Handy in tests and for offline
//!   smoke runs.
//!
//! ## Threading notes
//!
//! ONNX sessions are cached per thread, keyed by model and tokenizer path.
//! The first call on a thread pays the load cost.
//!
//! ## Quick example
//!
//! ```
//! use semantic::{load_embedder, RetrievalRole, SemanticConfig};
//!
//! let embedder = load_embedder(&SemanticConfig::stub()).unwrap();
//! let query = RetrievalRole::Query.apply("graph neural networks");
//! assert_eq!(query, "search_query: graph neural networks");
//! let vector = embedder.encode(&query).unwrap();
//! assert_eq!(vector.len(), 384);
//! ```

pub mod config;
pub mod device;
pub mod error;

mod cache;
mod normalize;
mod onnx;
mod stub;

pub use crate::config::{Backend, SemanticConfig};
pub use crate::device::{select_device, Device, DeviceProbe, HostProbe};
pub use crate::error::SemanticError;
pub use crate::normalize::l2_normalize_in_place;
pub use crate::onnx::OnnxEmbedder;
pub use crate::stub::StubEmbedder;

use tracing::info;

/// Prefix applied to corpus documents before encoding.
pub const DOCUMENT_PREFIX: &str = "search_document: ";
/// Prefix applied to queries before encoding.
pub const QUERY_PREFIX: &str = "search_query: ";

/// Which side of an asymmetric retrieval pair a text is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalRole {
    Document,
    Query,
}

impl RetrievalRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            RetrievalRole::Document => DOCUMENT_PREFIX,
            RetrievalRole::Query => QUERY_PREFIX,
        }
    }

    /// Returns `text` with this role's prefix prepended.
    pub fn apply(&self, text: &str) -> String {
        let prefix = self.prefix();
        let mut out = String::with_capacity(prefix.len() + text.len());
        out.push_str(prefix);
        out.push_str(text);
        out
    }
}

/// A loaded embedding model.
///
/// Output vectors are raw model outputs; callers normalise them if they need
/// unit length.
pub trait Embedder {
    /// Encode `texts` in chunks of `batch_size`, preserving input order.
    fn encode_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, SemanticError>;

    fn encode(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        self.encode_batch(&[text.to_string()], 1)?
            .pop()
            .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))
    }

    /// Device the model runs on.
    fn device(&self) -> Device;

    fn model_name(&self) -> &str;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn encode_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, SemanticError> {
        (**self).encode_batch(texts, batch_size)
    }

    fn device(&self) -> Device {
        (**self).device()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Select a device and load the configured backend onto it.
///
/// Any failure to locate or load the model is returned immediately.
pub fn load_embedder(cfg: &SemanticConfig) -> Result<Box<dyn Embedder + Send>, SemanticError> {
    cfg.validate()?;
    let embedder: Box<dyn Embedder + Send> = match cfg.backend {
        Backend::Stub => Box::new(StubEmbedder::new(cfg.stub_dimension)),
        Backend::Onnx => {
            // onnxruntime 0.0.14 ships without GPU execution providers.
            let device = select_device(&cfg.device_preference, &HostProbe, &[Device::Cpu]);
            Box::new(OnnxEmbedder::load(
                cfg.model_name.clone(),
                cfg.model_path.clone(),
                cfg.tokenizer_path.clone(),
                cfg.max_sequence_length,
                device,
            )?)
        }
    };
    info!(
        model = embedder.model_name(),
        device = %embedder.device(),
        backend = ?cfg.backend,
        "embedder_ready"
    );
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_asymmetric() {
        assert_eq!(
            RetrievalRole::Document.apply("cats purr"),
            "search_document: cats purr"
        );
        assert_eq!(RetrievalRole::Query.apply("cats"), "search_query: cats");
        assert_ne!(RetrievalRole::Document.prefix(), RetrievalRole::Query.prefix());
    }

    #[test]
    fn load_stub_embedder() {
        let embedder = load_embedder(&SemanticConfig::stub()).unwrap();
        assert_eq!(embedder.model_name(), "stub-trigram");
        assert_eq!(embedder.device(), Device::Cpu);
        let out = embedder
            .encode_batch(&["a".to_string(), "b".to_string(), "c".to_string()], 2)
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn missing_onnx_model_is_fatal() {
        let cfg = SemanticConfig {
            model_path: "/definitely/missing/model.onnx".into(),
            ..Default::default()
        };
        let err = load_embedder(&cfg).err().unwrap();
        assert!(matches!(err, SemanticError::ModelNotFound(_)));
    }

    #[test]
    fn invalid_config_rejected_before_loading() {
        let cfg = SemanticConfig::stub().with_batch_size(0);
        assert!(matches!(
            load_embedder(&cfg).err().unwrap(),
            SemanticError::InvalidConfig(_)
        ));
    }
}
