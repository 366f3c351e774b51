//! Prompt and response-schema construction for one batch.

use serde_json::{json, Map, Value};

use crate::config::PromptConfig;

/// Response key for the document at zero-based corpus position `index`.
pub fn annotation_key(index: usize) -> String {
    format!("annotation_{}", index + 1)
}

/// Everything a client needs to issue one structured-extraction call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub prompt: String,
    /// JSON schema the response object must satisfy.
    pub response_schema: Value,
    pub system_instruction: String,
}

impl ExtractionRequest {
    /// Request covering `documents`, which start at corpus position `start_index`.
    pub fn for_batch(cfg: &PromptConfig, documents: &[String], start_index: usize) -> Self {
        Self {
            prompt: build_prompt(cfg, documents, start_index),
            response_schema: response_schema(documents.len(), start_index),
            system_instruction: cfg.system_instruction.clone(),
        }
    }
}

/// Instruction followed by each document tagged with its 1-based corpus ordinal.
pub fn build_prompt(cfg: &PromptConfig, documents: &[String], start_index: usize) -> String {
    let body_len: usize = documents.iter().map(|d| d.len() + 32).sum();
    let mut prompt = String::with_capacity(cfg.instruction.len() + body_len + 2);
    prompt.push_str(&cfg.instruction);
    prompt.push_str("\n\n");
    for (i, doc) in documents.iter().enumerate() {
        prompt.push_str(&format!(
            "{} {}:\n{}\n\n",
            cfg.document_label,
            start_index + i + 1,
            doc
        ));
    }
    prompt
}

/// Object schema with one required string-array property per document.
pub fn response_schema(count: usize, start_index: usize) -> Value {
    let keys: Vec<String> = (start_index..start_index + count)
        .map(annotation_key)
        .collect();
    let mut properties = Map::with_capacity(count);
    for key in &keys {
        properties.insert(
            key.clone(),
            json!({ "type": "ARRAY", "items": { "type": "STRING" } }),
        );
    }
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": keys,
        "propertyOrdering": keys,
    })
}
