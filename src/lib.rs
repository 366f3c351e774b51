//! Semantic search and batched keyphrase extraction over scientific abstracts.
//!
//! The umbrella crate ties the workspace together:
//!
//! - [`EmbeddingSearchEngine`] embeds a corpus with the `semantic` crate,
//!   stores it in an `index::FlatIpIndex` and caches both the raw embedding
//!   matrix and the index on disk.
//! - [`eval`] scores any [`Searcher`] with MRR and Precision@5.
//! - [`config`] loads a single YAML file covering the engine, the extraction
//!   pipeline and logging.
//!
//! Extraction itself lives in the `extract` crate and is re-exported here.
//!
//! ```
//! use abstract_search::{EmbeddingSearchEngine, EngineConfig};
//! use semantic::{SemanticConfig, StubEmbedder};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = EngineConfig::default()
//!     .with_semantic(SemanticConfig::stub())
//!     .with_cache_dir(dir.path());
//! let mut engine = EmbeddingSearchEngine::with_embedder(StubEmbedder::new(1024), config);
//!
//! engine
//!     .build_index(vec!["graph neural networks".into(), "protein folding".into()], false)
//!     .unwrap();
//! let hits = engine.search("neural networks on graphs", 1).unwrap();
//! assert_eq!(hits[0].document_index, 0);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod eval;

pub use config::{AppConfig, ConfigLoadError, LoggingConfig};
pub use engine::{BuildSource, EmbeddingSearchEngine, EngineConfig, SearchHit, Searcher};
pub use error::EngineError;
pub use eval::{evaluate, EvalQuery, EvalReport, QueryScore};

pub use extract;
pub use index;
pub use semantic;
