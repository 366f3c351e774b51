use index::IndexError;
use semantic::SemanticError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from building or querying the embedding search engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("index has not been built; call build_index first")]
    NotReady,
    #[error("cannot build an index over an empty corpus")]
    EmptyCorpus,
    /// A cached artifact describes a different corpus than the one supplied.
    #[error("cache at {path} holds {found} vectors but the corpus has {expected} documents")]
    CacheMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_mismatch_names_path_and_counts() {
        let err = EngineError::CacheMismatch {
            path: PathBuf::from("cache/abstracts.index"),
            expected: 3,
            found: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("cache/abstracts.index"));
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn index_errors_pass_through() {
        let err: EngineError = IndexError::DimensionMismatch {
            expected: 768,
            found: 384,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::Index(IndexError::DimensionMismatch { .. })
        ));
    }
}
