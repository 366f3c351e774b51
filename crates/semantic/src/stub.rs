use fxhash::hash64;

use crate::device::Device;
use crate::{Embedder, SemanticError};

/// Deterministic embedder used when `backend` is `stub`.
///
/// Each lowercased word is padded with `#` and split into character trigrams;
/// every trigram adds one count to the bucket picked by its hash. Texts that
/// share word stems therefore share buckets, which gives the stub a crude but
/// reproducible notion of similarity. Vectors are *not* normalized.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dimension: usize,
    model_name: String,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: "stub-trigram".into(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let padded: Vec<char> = std::iter::once('#')
                .chain(word.to_lowercase().chars())
                .chain(std::iter::once('#'))
                .collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                let bucket = (hash64(gram.as_bytes()) % self.dimension as u64) as usize;
                v[bucket] += 1.0;
            }
        }
        v
    }
}

impl Embedder for StubEmbedder {
    fn encode_batch(
        &self,
        texts: &[String],
        _batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, SemanticError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
