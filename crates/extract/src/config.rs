use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ExtractError;

/// Sliding-window admission limits for outbound calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per trailing window.
    pub max_requests: usize,
    #[serde(with = "crate::serde_millis")]
    pub window: Duration,
    /// Extra wait added once the window is full.
    #[serde(with = "crate::serde_millis")]
    pub margin: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 14,
            window: Duration::from_secs(60),
            margin: Duration::from_millis(100),
        }
    }
}

impl RateLimitConfig {
    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.max_requests == 0 {
            return Err(ExtractError::InvalidConfig(
                "rate_limit.max_requests must be >= 1".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(ExtractError::InvalidConfig(
                "rate_limit.window must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Exponential backoff for retryable remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Add 0-50% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Wording sent to the model with every batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// Leading task description.
    pub instruction: String,
    /// Label placed before each document's ordinal, e.g. `Abstract 41:`.
    pub document_label: String,
    pub system_instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            instruction: "Extract 2-5 key phrases or words from each abstract. The key phrases \
                should reflect the main topic and the important concepts."
                .into(),
            document_label: "Abstract".into(),
            system_instruction: "You are an expert in analysing scientific texts. Extract the \
                most significant key phrases and terms that best characterise the content of \
                each abstract."
                .into(),
        }
    }
}

/// Connection settings for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(with = "crate::serde_millis")]
    pub request_timeout: Duration,
    #[serde(with = "crate::serde_millis")]
    pub connect_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl GeminiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Batching and concurrency for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Documents per remote call.
    pub batch_size: usize,
    /// Batch jobs allowed in flight at once.
    pub max_concurrent: usize,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub prompt: PromptConfig,
    pub gemini: GeminiConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_concurrent: 5,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            prompt: PromptConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.batch_size == 0 {
            return Err(ExtractError::InvalidConfig(
                "batch_size must be >= 1".into(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_concurrent must be >= 1".into(),
            ));
        }
        self.rate_limit.validate()
    }
}
