//! Per-thread ONNX session cache.
//!
//! `onnxruntime` sessions are neither `Send` nor cheap to build, so each
//! thread loads its own copy the first time it touches a model and keeps it
//! for the life of the thread.

use once_cell::sync::OnceCell;
use onnxruntime::{environment::Environment, session::Session};
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokenizers::Tokenizer;
use tracing::info;

use crate::SemanticError;

static ORT_ENV: OnceCell<Environment> = OnceCell::new();

/// Model and tokenizer file pair identifying a loaded model.
type ModelFiles = (PathBuf, PathBuf);

thread_local! {
    static LOADED: RefCell<HashMap<ModelFiles, Rc<LoadedModel>>> = RefCell::new(HashMap::new());
}

pub(crate) struct LoadedModel {
    pub(crate) tokenizer: Tokenizer,
    pub(crate) session: RefCell<Session<'static>>,
}

fn inference_err(e: impl std::fmt::Display) -> SemanticError {
    SemanticError::Inference(e.to_string())
}

fn load(model_path: &Path, tokenizer_path: &Path) -> Result<LoadedModel, SemanticError> {
    if !model_path.is_file() {
        return Err(SemanticError::ModelNotFound(model_path.display().to_string()));
    }
    if !tokenizer_path.is_file() {
        return Err(SemanticError::TokenizerMissing(
            tokenizer_path.display().to_string(),
        ));
    }

    let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(inference_err)?;
    let env = ORT_ENV.get_or_try_init(|| {
        Environment::builder()
            .with_name("abstract-search")
            .build()
            .map_err(inference_err)
    })?;
    let session = env
        .new_session_builder()
        .and_then(|b| b.with_model_from_file(model_path.to_path_buf()))
        .map_err(inference_err)?;

    info!(
        model = %model_path.display(),
        tokenizer = %tokenizer_path.display(),
        "onnx_model_loaded"
    );
    Ok(LoadedModel {
        tokenizer,
        session: RefCell::new(session),
    })
}

/// This thread's handle for the given files, loaded on first use.
pub(crate) fn model_for_thread(
    model_path: &Path,
    tokenizer_path: &Path,
) -> Result<Rc<LoadedModel>, SemanticError> {
    LOADED.with(|loaded| {
        match loaded
            .borrow_mut()
            .entry((model_path.to_path_buf(), tokenizer_path.to_path_buf()))
        {
            Entry::Occupied(hit) => Ok(Rc::clone(hit.get())),
            Entry::Vacant(slot) => {
                let model = Rc::new(load(model_path, tokenizer_path)?);
                Ok(Rc::clone(slot.insert(model)))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_model_is_reported_before_tokenizer() {
        let err = model_for_thread(
            Path::new("/nonexistent/model.onnx"),
            Path::new("/nonexistent/tokenizer.json"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SemanticError::ModelNotFound(p) if p.contains("model.onnx")));
    }

    #[test]
    fn absent_tokenizer_is_reported() {
        let dir = std::env::temp_dir().join("abstract-search-cache-test");
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("model.onnx");
        std::fs::write(&model, b"not really a model").unwrap();

        let err = model_for_thread(&model, &dir.join("tokenizer.json"))
            .err()
            .unwrap();
        assert!(matches!(err, SemanticError::TokenizerMissing(_)));
    }
}
