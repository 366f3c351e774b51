//! Dense-embedding search over a document corpus.
//!
//! Building goes through a two-level cache: a persisted index is reused as
//! is, otherwise a persisted embedding matrix is re-indexed, otherwise the
//! corpus is embedded from scratch. Both caches are keyed only by path; a
//! cache whose size disagrees with the corpus is rejected rather than served.

use index::{normalize_l2, EmbeddingMatrix, FlatIpIndex, EMPTY_SLOT};
use semantic::{
    l2_normalize_in_place, load_embedder, Device, Embedder, RetrievalRole, SemanticConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, info_span};

use crate::error::EngineError;

/// Where the engine keeps its model settings and cache files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub semantic: SemanticConfig,
    /// Raw (unnormalised) document embeddings.
    pub embedding_cache_path: PathBuf,
    pub index_cache_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            semantic: SemanticConfig::default(),
            embedding_cache_path: PathBuf::from("./cache/embeddings.bin"),
            index_cache_path: PathBuf::from("./cache/abstracts.index"),
        }
    }
}

impl EngineConfig {
    pub fn with_semantic(mut self, semantic: SemanticConfig) -> Self {
        self.semantic = semantic;
        self
    }

    /// Put both cache files under `dir` with their default names.
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.embedding_cache_path = dir.join("embeddings.bin");
        self.index_cache_path = dir.join("abstracts.index");
        self
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the document in the corpus.
    pub document_index: usize,
    pub text: String,
    /// Similarity, rounded to 4 decimals. `None` for rankers without scores.
    pub score: Option<f32>,
}

/// Anything that ranks corpus documents for a query.
pub trait Searcher {
    fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>, EngineError>;
}

/// Which path `build_index` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSource {
    IndexCache,
    EmbeddingCache,
    Computed,
}

struct IndexedCorpus {
    index: FlatIpIndex,
    documents: Vec<String>,
}

pub struct EmbeddingSearchEngine {
    embedder: Box<dyn Embedder + Send>,
    config: EngineConfig,
    corpus: Option<IndexedCorpus>,
}

impl EmbeddingSearchEngine {
    /// Select a device and load the configured model. Load failures are fatal.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let embedder = load_embedder(&config.semantic)?;
        Ok(Self::from_parts(embedder, config))
    }

    /// Use an already constructed embedder.
    pub fn with_embedder<E>(embedder: E, config: EngineConfig) -> Self
    where
        E: Embedder + Send + 'static,
    {
        Self::from_parts(Box::new(embedder), config)
    }

    fn from_parts(embedder: Box<dyn Embedder + Send>, config: EngineConfig) -> Self {
        info!(
            model = embedder.model_name(),
            device = %embedder.device(),
            index_cache = %config.index_cache_path.display(),
            embedding_cache = %config.embedding_cache_path.display(),
            "engine_initialized"
        );
        Self {
            embedder,
            config,
            corpus: None,
        }
    }

    pub fn device(&self) -> Device {
        self.embedder.device()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.corpus.is_some()
    }

    /// Documents backing the current index, if built.
    pub fn documents(&self) -> Option<&[String]> {
        self.corpus.as_ref().map(|c| c.documents.as_slice())
    }

    /// Build (or reload) the index for `documents`.
    ///
    /// With `force_rebuild` both caches are ignored and overwritten. The
    /// previous index, if any, stays in place until the new one is complete.
    pub fn build_index(
        &mut self,
        documents: Vec<String>,
        force_rebuild: bool,
    ) -> Result<BuildSource, EngineError> {
        if documents.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }
        let _span = info_span!("build_index", documents = documents.len(), force_rebuild).entered();
        let start = Instant::now();
        let expected = documents.len();
        let index_path = &self.config.index_cache_path;

        let (index, source) = if !force_rebuild && index_path.exists() {
            let index = FlatIpIndex::read_from_path(index_path)?;
            check_size(index_path, expected, index.ntotal())?;
            (index, BuildSource::IndexCache)
        } else {
            let (matrix, source) = self.embedding_matrix(&documents, force_rebuild)?;
            let mut rows = matrix.into_inner();
            normalize_l2(&mut rows);
            let mut index = FlatIpIndex::new(rows.ncols());
            index.add(rows.view())?;
            index.write_to_path(index_path)?;
            (index, source)
        };

        info!(
            vectors = index.ntotal(),
            dimension = index.dimension(),
            source = ?source,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index_ready"
        );
        self.corpus = Some(IndexedCorpus { index, documents });
        Ok(source)
    }

    fn embedding_matrix(
        &self,
        documents: &[String],
        force_rebuild: bool,
    ) -> Result<(EmbeddingMatrix, BuildSource), EngineError> {
        let path = &self.config.embedding_cache_path;
        if !force_rebuild && path.exists() {
            let matrix = EmbeddingMatrix::load(path)?;
            check_size(path, documents.len(), matrix.rows())?;
            return Ok((matrix, BuildSource::EmbeddingCache));
        }

        let start = Instant::now();
        let prefixed: Vec<String> = documents
            .iter()
            .map(|d| RetrievalRole::Document.apply(d))
            .collect();
        let rows = self
            .embedder
            .encode_batch(&prefixed, self.config.semantic.batch_size)?;
        if rows.len() != documents.len() {
            return Err(semantic::SemanticError::Inference(format!(
                "model returned {} vectors for {} documents",
                rows.len(),
                documents.len()
            ))
            .into());
        }
        let matrix = EmbeddingMatrix::from_rows(rows)?;
        info!(
            documents = documents.len(),
            dimension = matrix.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "embeddings_computed"
        );
        matrix.save(path)?;
        Ok((matrix, BuildSource::Computed))
    }

    /// Top `top_n` documents for `query`, best first.
    pub fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>, EngineError> {
        let corpus = self.corpus.as_ref().ok_or(EngineError::NotReady)?;
        if top_n == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let mut vector = self.embedder.encode(&RetrievalRole::Query.apply(query))?;
        l2_normalize_in_place(&mut vector);
        let (scores, ids) = corpus.index.search(&vector, top_n)?;

        let hits: Vec<SearchHit> = ids
            .into_iter()
            .zip(scores)
            .filter(|(id, _)| *id != EMPTY_SLOT)
            .filter_map(|(id, score)| {
                let document_index = usize::try_from(id).ok()?;
                let text = corpus.documents.get(document_index)?.clone();
                Some(SearchHit {
                    document_index,
                    text,
                    score: Some(round4(score)),
                })
            })
            .collect();

        debug!(
            top_n,
            returned = hits.len(),
            elapsed_micros = start.elapsed().as_micros() as u64,
            "search_done"
        );
        Ok(hits)
    }
}

impl Searcher for EmbeddingSearchEngine {
    fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>, EngineError> {
        EmbeddingSearchEngine::search(self, query, top_n)
    }
}

fn check_size(path: &Path, expected: usize, found: usize) -> Result<(), EngineError> {
    if expected == found {
        Ok(())
    } else {
        Err(EngineError::CacheMismatch {
            path: path.to_path_buf(),
            expected,
            found,
        })
    }
}

fn round4(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}
