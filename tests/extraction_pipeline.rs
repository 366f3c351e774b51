use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extract::{
    annotation_key, ClientError, ExtractionClient, ExtractionConfig, ExtractionPipeline,
    ExtractionRequest, RateLimitConfig, SlidingWindowLimiter,
};
use serde_json::{json, Map, Value};
use tokio::time::Instant;

type Behaviour = dyn Fn(&[String], u32) -> Option<ClientError> + Send + Sync;
type Latency = dyn Fn(&[String]) -> Duration + Send + Sync;

/// Answers every requested key with one keyphrase derived from the key,
/// unless the behaviour callback injects a failure for that batch.
struct Mock {
    behaviour: Box<Behaviour>,
    attempts: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    latency: Box<Latency>,
    finished: Mutex<Vec<String>>,
}

impl Mock {
    fn new<F>(behaviour: F) -> Self
    where
        F: Fn(&[String], u32) -> Option<ClientError> + Send + Sync + 'static,
    {
        Self {
            behaviour: Box::new(behaviour),
            attempts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            latency: Box::new(|_| Duration::ZERO),
            finished: Mutex::new(Vec::new()),
        }
    }

    fn always_ok() -> Self {
        Self::new(|_, _| None)
    }

    fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_by(move |_| latency)
    }

    fn with_latency_by<F>(mut self, latency: F) -> Self
    where
        F: Fn(&[String]) -> Duration + Send + Sync + 'static,
    {
        self.latency = Box::new(latency);
        self
    }

    fn attempts_for(&self, first_key: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .find(|(keys, _)| keys.split(',').next() == Some(first_key))
            .map_or(0, |(_, n)| *n)
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

fn requested_keys(request: &ExtractionRequest) -> Vec<String> {
    request.response_schema["required"]
        .as_array()
        .map(|keys| {
            keys.iter()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ExtractionClient for Mock {
    async fn generate(&self, request: &ExtractionRequest) -> Result<Value, ClientError> {
        let keys = requested_keys(request);
        self.calls.lock().unwrap().push(Instant::now());
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(keys.join(",")).or_insert(0);
            *n += 1;
            *n
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let latency = (self.latency)(&keys);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(first) = keys.first() {
            self.finished.lock().unwrap().push(first.clone());
        }

        if let Some(err) = (self.behaviour)(&keys, attempt) {
            return Err(err);
        }
        let mut out = Map::new();
        for key in keys {
            out.insert(key.clone(), json!([format!("kp-{key}")]));
        }
        Ok(Value::Object(out))
    }
}

fn docs(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("abstract number {i}")).collect()
}

fn config(batch_size: usize, max_concurrent: usize) -> ExtractionConfig {
    ExtractionConfig::default()
        .with_batch_size(batch_size)
        .with_max_concurrent(max_concurrent)
        .with_rate_limit(RateLimitConfig::default().with_max_requests(1_000))
}

fn pipeline(mock: Arc<Mock>, cfg: &ExtractionConfig) -> ExtractionPipeline {
    let limiter = Arc::new(SlidingWindowLimiter::new(cfg.rate_limit));
    ExtractionPipeline::new(mock, limiter, cfg).unwrap()
}

fn phrase(index: usize) -> Option<Vec<String>> {
    Some(vec![format!("kp-{}", annotation_key(index))])
}

#[tokio::test(start_paused = true)]
async fn every_document_gets_its_own_keyphrases() {
    let mock = Arc::new(Mock::always_ok());
    let report = pipeline(mock.clone(), &config(3, 2))
        .process_all(&docs(7))
        .await;

    assert_eq!(report.total_batches, 3);
    assert_eq!(report.successful_batches, 3);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(report.success_rate(), 1.0);
    assert_eq!(report.rows.len(), 7);
    for (i, row) in report.rows.iter().enumerate() {
        assert_eq!(*row, phrase(i), "row {i}");
    }
    assert_eq!(mock.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_leaves_exactly_its_range_empty() {
    // Batch 1 covers documents 2 and 3.
    let mock = Arc::new(Mock::new(|keys, _| {
        keys.iter()
            .any(|k| k == "annotation_3")
            .then(|| ClientError::http(400, "invalid argument"))
    }));
    let report = pipeline(mock, &config(2, 5)).process_all(&docs(6)).await;

    assert_eq!(report.successful_batches, 2);
    assert_eq!(report.failed_batches, 1);
    assert!((report.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(report.rows[0], phrase(0));
    assert_eq!(report.rows[1], phrase(1));
    assert_eq!(report.rows[2], None);
    assert_eq!(report.rows[3], None);
    assert_eq!(report.rows[4], phrase(4));
    assert_eq!(report.rows[5], phrase(5));
    assert_eq!(report.annotated_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn batch_exhausting_retries_leaves_only_its_range_empty() {
    // Batch 1 covers documents 2 and 3 and is overloaded on every attempt.
    let mock = Arc::new(
        Mock::new(|keys, _| {
            (keys[0] == "annotation_3").then(|| ClientError::http(503, "model overloaded"))
        })
        .with_latency_by(|keys| match keys[0].as_str() {
            "annotation_1" => Duration::from_secs(30),
            "annotation_5" => Duration::from_secs(1),
            _ => Duration::from_secs(10),
        }),
    );
    let started = Instant::now();
    let report = pipeline(mock.clone(), &config(2, 4))
        .process_all(&docs(8))
        .await;

    assert_eq!(report.total_batches, 4);
    assert_eq!(report.successful_batches, 3);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(mock.attempts_for("annotation_3"), 4);
    for i in [0, 1, 4, 5, 6, 7] {
        assert_eq!(report.rows[i], phrase(i), "row {i}");
    }
    assert_eq!(report.rows[2], None);
    assert_eq!(report.rows[3], None);

    // Batches completed out of submission order.
    let finished = mock.finished.lock().unwrap().clone();
    assert_eq!(finished.first().map(String::as_str), Some("annotation_5"));
    assert_eq!(finished.last().map(String::as_str), Some("annotation_3"));
    // Four 10 s attempts plus 5 + 10 + 20 s of backoff.
    assert!(started.elapsed() >= Duration::from_secs(75));
}

#[tokio::test(start_paused = true)]
async fn empty_responses_count_as_failed_batches() {
    struct EmptyObject;

    #[async_trait]
    impl ExtractionClient for EmptyObject {
        async fn generate(&self, _request: &ExtractionRequest) -> Result<Value, ClientError> {
            Ok(json!({}))
        }
    }

    let cfg = config(2, 2);
    let limiter = Arc::new(SlidingWindowLimiter::new(cfg.rate_limit));
    let report = ExtractionPipeline::new(Arc::new(EmptyObject), limiter, &cfg)
        .unwrap()
        .process_all(&docs(3))
        .await;

    assert_eq!(report.total_batches, 2);
    assert_eq!(report.successful_batches, 0);
    assert_eq!(report.failed_batches, 2);
    assert_eq!(report.success_rate(), 0.0);
    assert_eq!(report.rows, vec![None, None, None]);
}

#[tokio::test(start_paused = true)]
async fn quota_errors_are_retried_with_growing_backoff() {
    let mock = Arc::new(Mock::new(|_, attempt| {
        (attempt <= 2).then(|| ClientError::http(429, "quota exceeded"))
    }));
    let started = Instant::now();
    let report = pipeline(mock.clone(), &config(4, 1))
        .process_all(&docs(2))
        .await;

    assert_eq!(report.successful_batches, 1);
    assert_eq!(report.rows, vec![phrase(0), phrase(1)]);
    let calls = mock.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1] - calls[0], Duration::from_secs(5));
    assert_eq!(calls[2] - calls[1], Duration::from_secs(10));
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_is_not_retried() {
    let mock = Arc::new(Mock::new(|_, _| {
        Some(ClientError::http(403, "permission denied"))
    }));
    let report = pipeline(mock.clone(), &config(5, 1))
        .process_all(&docs(3))
        .await;

    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.rows, vec![None, None, None]);
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn limiter_delays_the_request_past_capacity() {
    let mock = Arc::new(Mock::always_ok());
    let cfg = config(1, 8).with_rate_limit(
        RateLimitConfig::default()
            .with_max_requests(3)
            .with_window(Duration::from_secs(60)),
    );
    let pipeline = pipeline(mock.clone(), &cfg);
    let report = pipeline.process_all(&docs(4)).await;
    assert_eq!(report.successful_batches, 4);

    let mut calls = mock.calls();
    calls.sort();
    assert_eq!(calls.len(), 4);
    assert!(calls[2] - calls[0] < Duration::from_secs(1));
    assert!(calls[3] - calls[0] >= Duration::from_secs(60));

    let stats = pipeline.limiter().stats().await;
    assert_eq!(stats.total_requests, 4);
    assert!(stats.total_waits >= 1);
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_the_gate() {
    let mock = Arc::new(Mock::always_ok().with_latency(Duration::from_secs(2)));
    let report = pipeline(mock.clone(), &config(1, 2))
        .process_all(&docs(6))
        .await;

    assert_eq!(report.successful_batches, 6);
    assert_eq!(mock.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn panicking_batch_is_counted_as_failed() {
    let mock = Arc::new(Mock::new(|keys, _| {
        if keys.iter().any(|k| k == "annotation_1") {
            panic!("client blew up");
        }
        None
    }));
    let report = pipeline(mock, &config(1, 3)).process_all(&docs(3)).await;

    assert_eq!(report.total_batches, 3);
    assert_eq!(report.successful_batches, 2);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.rows, vec![None, phrase(1), phrase(2)]);
}

#[tokio::test(start_paused = true)]
async fn empty_corpus_yields_empty_report() {
    let mock = Arc::new(Mock::always_ok());
    let report = pipeline(mock.clone(), &config(3, 2)).process_all(&[]).await;

    assert_eq!(report.total_batches, 0);
    assert!(report.rows.is_empty());
    assert_eq!(report.success_rate(), 1.0);
    assert!(mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn report_round_trips_through_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotated.json");
    let documents = docs(3);
    let report = pipeline(Arc::new(Mock::always_ok()), &config(2, 2))
        .process_all(&documents)
        .await;

    report.save_json(&documents, &path).unwrap();
    let loaded = extract::load_annotations(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[2].text, documents[2]);
    assert_eq!(loaded[2].keyphrases, phrase(2));
}
