use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use crate::client::ExtractionClient;
use crate::config::{PromptConfig, RetryConfig};
use crate::prompt::ExtractionRequest;
use crate::rate_limit::SlidingWindowLimiter;
use crate::retry::{backoff_delay, ErrorClass, ErrorClassifier};

/// Collaborators shared by every batch job of a run.
#[derive(Clone)]
pub struct BatchContext {
    pub client: Arc<dyn ExtractionClient>,
    pub classifier: Arc<dyn ErrorClassifier>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub prompt: Arc<PromptConfig>,
    pub retry: RetryConfig,
}

/// Terminal state of one batch job.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_id: usize,
    /// Structured response, `None` when the batch failed.
    pub response: Option<Map<String, Value>>,
    /// Remote calls made, including the successful one.
    pub attempts: u32,
}

/// Run one batch through the limiter and the remote client, retrying
/// retryable failures with exponential backoff.
///
/// Remote failures never escape: a batch that cannot be completed comes back
/// with `response: None`.
pub async fn extract_batch(
    ctx: &BatchContext,
    documents: &[String],
    start_index: usize,
    batch_id: usize,
) -> BatchOutcome {
    let span = info_span!(
        "batch",
        batch_id,
        first = start_index + 1,
        last = start_index + documents.len()
    );
    run_batch(ctx, documents, start_index, batch_id)
        .instrument(span)
        .await
}

async fn run_batch(
    ctx: &BatchContext,
    documents: &[String],
    start_index: usize,
    batch_id: usize,
) -> BatchOutcome {
    let request = ExtractionRequest::for_batch(&ctx.prompt, documents, start_index);
    let max_retries = ctx.retry.max_retries;

    for attempt in 0..=max_retries {
        ctx.limiter.acquire().await;
        info!(attempt = attempt + 1, "batch_sent");

        let error = match ctx.client.generate(&request).await {
            Ok(Value::Object(map)) if map.is_empty() => {
                warn!(attempt = attempt + 1, "batch_response_empty");
                return failed(batch_id, attempt + 1);
            }
            Ok(Value::Object(map)) => {
                info!(attempt = attempt + 1, "batch_succeeded");
                return BatchOutcome {
                    batch_id,
                    response: Some(map),
                    attempts: attempt + 1,
                };
            }
            Ok(other) => {
                warn!(kind = json_kind(&other), "batch_response_not_an_object");
                return failed(batch_id, attempt + 1);
            }
            Err(err) => err,
        };

        let class = ctx.classifier.classify(&error);
        if class == ErrorClass::Retryable && attempt < max_retries {
            let delay = backoff_delay(&ctx.retry, attempt);
            warn!(
                attempt = attempt + 1,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "batch_retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        warn!(
            attempts = attempt + 1,
            error = %error,
            retryable = class == ErrorClass::Retryable,
            "batch_failed"
        );
        return failed(batch_id, attempt + 1);
    }

    failed(batch_id, max_retries + 1)
}

fn failed(batch_id: usize, attempts: u32) -> BatchOutcome {
    BatchOutcome {
        batch_id,
        response: None,
        attempts,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
