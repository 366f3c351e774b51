use onnxruntime::ndarray::{Array2, ArrayD};
use std::path::PathBuf;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::cache::{model_for_thread, LoadedModel};
use crate::device::Device;
use crate::{Embedder, SemanticError};

/// Local ONNX sentence embedder.
///
/// Only paths are stored here; the session itself lives in a per-thread
/// cache, so the embedder can be moved between threads.
#[derive(Debug, Clone)]
pub struct OnnxEmbedder {
    model_name: String,
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    max_sequence_length: usize,
    device: Device,
}

impl OnnxEmbedder {
    /// Load the model on the calling thread. Missing files fail here.
    pub fn load(
        model_name: impl Into<String>,
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        max_sequence_length: usize,
        device: Device,
    ) -> Result<Self, SemanticError> {
        model_for_thread(&model_path, &tokenizer_path)?;
        Ok(Self {
            model_name: model_name.into(),
            model_path,
            tokenizer_path,
            max_sequence_length,
            device,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn encode_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, SemanticError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = model_for_thread(&self.model_path, &self.tokenizer_path)?;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            let start = Instant::now();
            let batch = TokenBatch::tokenize(&model.tokenizer, chunk, self.max_sequence_length)?;
            out.extend(embed(&model, batch)?);
            debug!(
                batch = chunk.len(),
                elapsed_micros = start.elapsed().as_micros() as u64,
                "onnx_batch_done"
            );
        }
        Ok(out)
    }

    fn device(&self) -> Device {
        self.device
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn inference(msg: impl Into<String>) -> SemanticError {
    SemanticError::Inference(msg.into())
}

/// Right-padded token ids and attention mask, `[batch, width]`.
struct TokenBatch {
    ids: Array2<i64>,
    mask: Array2<i64>,
}

impl TokenBatch {
    fn tokenize(
        tokenizer: &Tokenizer,
        texts: &[String],
        max_len: usize,
    ) -> Result<Self, SemanticError> {
        let mut rows = Vec::with_capacity(texts.len());
        for text in texts {
            let enc = tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| inference(e.to_string()))?;
            let keep = enc.get_ids().len().min(max_len);
            let ids = enc.get_ids()[..keep].iter().map(|&t| i64::from(t));
            let mask = enc.get_attention_mask().iter().take(keep).map(|&m| i64::from(m));
            rows.push((ids.collect(), mask.collect()));
        }
        Self::pad(rows)
    }

    fn pad(rows: Vec<(Vec<i64>, Vec<i64>)>) -> Result<Self, SemanticError> {
        let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);
        let mut ids = Array2::<i64>::zeros((rows.len(), width));
        let mut mask = Array2::<i64>::zeros((rows.len(), width));
        for (r, (row_ids, row_mask)) in rows.iter().enumerate() {
            if row_ids.len() != row_mask.len() {
                return Err(inference("tokenizer produced mismatched id/mask lengths"));
            }
            for (c, (&id, &m)) in row_ids.iter().zip(row_mask).enumerate() {
                ids[[r, c]] = id;
                mask[[r, c]] = m;
            }
        }
        Ok(Self { ids, mask })
    }

    fn shape(&self) -> (usize, usize) {
        self.ids.dim()
    }
}

fn embed(model: &LoadedModel, batch: TokenBatch) -> Result<Vec<Vec<f32>>, SemanticError> {
    let (rows, width) = batch.shape();
    let mask = batch.mask.clone();
    let mut session = model.session.borrow_mut();

    let mut ids = Some(batch.ids);
    let mut attention = Some(batch.mask);
    let mut inputs: Vec<ArrayD<i64>> = Vec::with_capacity(session.inputs.len());
    for input in &session.inputs {
        let tensor = match input.name.as_str() {
            "input_ids" => ids.take(),
            "attention_mask" => attention.take(),
            "token_type_ids" => Some(Array2::<i64>::zeros((rows, width))),
            other => return Err(inference(format!("unsupported model input '{other}'"))),
        };
        let tensor = tensor
            .ok_or_else(|| inference(format!("model declares '{}' twice", input.name)))?;
        inputs.push(tensor.into_dyn());
    }
    if inputs.is_empty() {
        return Err(inference("model did not declare any inputs"));
    }

    let outputs = session
        .run::<i64, f32, _>(inputs)
        .map_err(|e| inference(e.to_string()))?;
    let first = outputs
        .into_iter()
        .next()
        .ok_or_else(|| inference("model returned no outputs"))?;
    let shape = first.shape().to_vec();
    let flat: Vec<f32> = first.iter().copied().collect();

    match shape.as_slice() {
        // Token-level output: pool over real tokens.
        [b, t, h] if *b == rows && *t == width => Ok(masked_mean_pool(&flat, &mask, *h)),
        // Already pooled.
        [b, h] if *b == rows && *h > 0 => Ok(flat.chunks(*h).map(<[f32]>::to_vec).collect()),
        _ => Err(inference(format!(
            "unexpected model output shape {shape:?} for batch {rows}"
        ))),
    }
}

/// Mean of each row's token vectors where the mask is set.
///
/// `hidden` is a row-major `[batch, width, dim]` buffer matching `mask`.
fn masked_mean_pool(hidden: &[f32], mask: &Array2<i64>, dim: usize) -> Vec<Vec<f32>> {
    let width = mask.ncols();
    mask.outer_iter()
        .enumerate()
        .map(|(b, row)| {
            let mut sum = vec![0f32; dim];
            let mut tokens = 0usize;
            for (t, &m) in row.iter().enumerate() {
                if m == 0 {
                    continue;
                }
                let at = (b * width + t) * dim;
                sum.iter_mut()
                    .zip(&hidden[at..at + dim])
                    .for_each(|(acc, &x)| *acc += x);
                tokens += 1;
            }
            if tokens > 0 {
                let n = tokens as f32;
                sum.iter_mut().for_each(|v| *v /= n);
            }
            sum
        })
        .collect()
}
