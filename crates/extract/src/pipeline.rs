use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::batch::{extract_batch, BatchContext, BatchOutcome};
use crate::client::ExtractionClient;
use crate::config::{ExtractionConfig, PromptConfig};
use crate::prompt::annotation_key;
use crate::rate_limit::SlidingWindowLimiter;
use crate::retry::{ErrorClassifier, SubstringClassifier};
use crate::ExtractError;

/// Splits a corpus into batches and runs them concurrently.
///
/// At most `max_concurrent` batch jobs hold a permit at once, and every job
/// also passes the shared rate limiter, so the outbound rate is bounded by the
/// limiter whatever the concurrency.
pub struct ExtractionPipeline {
    ctx: BatchContext,
    batch_size: usize,
    max_concurrent: usize,
}

impl ExtractionPipeline {
    pub fn new(
        client: Arc<dyn ExtractionClient>,
        limiter: Arc<SlidingWindowLimiter>,
        config: &ExtractionConfig,
    ) -> Result<Self, ExtractError> {
        config.validate()?;
        Ok(Self {
            ctx: BatchContext {
                client,
                classifier: Arc::new(SubstringClassifier),
                limiter,
                prompt: Arc::new(config.prompt.clone()),
                retry: config.retry,
            },
            batch_size: config.batch_size,
            max_concurrent: config.max_concurrent,
        })
    }

    /// Swap the error classification strategy.
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.ctx.classifier = classifier;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.ctx.prompt = Arc::new(prompt);
        self
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.ctx.limiter
    }

    /// Extract keyphrases for every document.
    ///
    /// Waits for all batches to finish. Failed or panicking batches leave
    /// their rows empty and are counted; they never cancel siblings. Dropping
    /// the returned future aborts every outstanding batch.
    pub async fn process_all(&self, documents: &[String]) -> ExtractionReport {
        let started = Instant::now();
        let total_batches = documents.len().div_ceil(self.batch_size);
        info!(
            documents = documents.len(),
            total_batches,
            batch_size = self.batch_size,
            max_concurrent = self.max_concurrent,
            max_retries = self.ctx.retry.max_retries,
            "extraction_started"
        );

        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let mut jobs = JoinSet::new();
        for (batch_id, chunk) in documents.chunks(self.batch_size).enumerate() {
            let ctx = self.ctx.clone();
            let gate = gate.clone();
            let chunk = chunk.to_vec();
            let start_index = batch_id * self.batch_size;
            jobs.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return BatchOutcome {
                        batch_id,
                        response: None,
                        attempts: 0,
                    };
                };
                extract_batch(&ctx, &chunk, start_index, batch_id).await
            });
        }

        let mut rows: Vec<Option<Vec<String>>> = vec![None; documents.len()];
        let mut successful_batches = 0;
        while let Some(joined) = jobs.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "batch_job_crashed");
                    continue;
                }
            };
            let Some(response) = outcome.response else {
                continue;
            };
            successful_batches += 1;
            let start = outcome.batch_id * self.batch_size;
            let end = (start + self.batch_size).min(documents.len());
            for (index, row) in rows.iter_mut().enumerate().take(end).skip(start) {
                let key = annotation_key(index);
                match response.get(&key) {
                    Some(value) => match serde_json::from_value::<Vec<String>>(value.clone()) {
                        Ok(phrases) => *row = Some(phrases),
                        Err(_) => warn!(key = %key, "annotation_not_a_string_list"),
                    },
                    None => warn!(key = %key, "annotation_missing"),
                }
            }
        }

        let report = ExtractionReport {
            rows,
            total_batches,
            successful_batches,
            failed_batches: total_batches - successful_batches,
            elapsed: started.elapsed(),
        };
        info!(
            successful = report.successful_batches,
            failed = report.failed_batches,
            total = report.total_batches,
            success_pct = report.success_rate() * 100.0,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "extraction_finished"
        );
        report
    }
}

/// Result of a pipeline run. `rows[i]` belongs to document `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub rows: Vec<Option<Vec<String>>>,
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    #[serde(with = "crate::serde_millis")]
    pub elapsed: Duration,
}

/// A document paired with its extracted keyphrases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub text: String,
    pub keyphrases: Option<Vec<String>>,
}

impl ExtractionReport {
    /// Fraction of batches that succeeded. An empty run counts as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.total_batches == 0 {
            1.0
        } else {
            self.successful_batches as f64 / self.total_batches as f64
        }
    }

    /// Documents that received keyphrases.
    pub fn annotated_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    /// Zip the result column onto the documents it was computed for.
    pub fn annotate(&self, documents: &[String]) -> Vec<AnnotatedDocument> {
        documents
            .iter()
            .zip(self.rows.iter().chain(std::iter::repeat(&None)))
            .map(|(text, keyphrases)| AnnotatedDocument {
                text: text.clone(),
                keyphrases: keyphrases.clone(),
            })
            .collect()
    }

    /// Write the annotated documents to `path` as a JSON array.
    pub fn save_json(&self, documents: &[String], path: &Path) -> Result<(), ExtractError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.annotate(documents))?;
        info!(path = %path.display(), documents = documents.len(), "annotations_saved");
        Ok(())
    }
}

/// Read a file written by [`ExtractionReport::save_json`].
pub fn load_annotations(path: &Path) -> Result<Vec<AnnotatedDocument>, ExtractError> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}
