//! Retry classification and backoff.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::ClientError;

/// Whether a failed call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

/// Strategy deciding how a remote failure is handled.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &ClientError) -> ErrorClass;
}

/// Classifies by looking for rate-limit and overload markers in the message.
///
/// Retryable: `429`, `quota` (rate limiting), `502`, `503`, `overloaded`
/// (transient server trouble). Everything else is final.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringClassifier;

impl ErrorClassifier for SubstringClassifier {
    fn classify(&self, error: &ClientError) -> ErrorClass {
        let msg = &error.message;
        let lower = msg.to_lowercase();
        let rate_limited = msg.contains("429") || lower.contains("quota");
        let overloaded = msg.contains("503") || msg.contains("502") || lower.contains("overloaded");
        if rate_limited || overloaded {
            ErrorClass::Retryable
        } else {
            ErrorClass::NonRetryable
        }
    }
}

/// Uses the HTTP status when present and falls back to message markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusAwareClassifier;

impl ErrorClassifier for StatusAwareClassifier {
    fn classify(&self, error: &ClientError) -> ErrorClass {
        match error.status {
            Some(429 | 502 | 503) => ErrorClass::Retryable,
            _ => SubstringClassifier.classify(error),
        }
    }
}

/// Delay before retry number `attempt + 1`: `base_delay * 2^attempt`, capped at
/// `max_delay`, plus optional jitter.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    let delay = config
        .base_delay
        .saturating_mul(factor)
        .min(config.max_delay);

    if config.jitter {
        let millis = delay.as_millis() as u64;
        delay + Duration::from_millis(fastrand::u64(0..=millis / 2))
    } else {
        delay
    }
}
