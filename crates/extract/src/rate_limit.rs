//! Sliding-window rate limiting for outbound calls.
//!
//! Admits at most `max_requests` calls in any trailing `window`. Unlike a token
//! bucket there is no burst credit: once the window holds `max_requests`
//! timestamps, the next caller waits until the oldest one ages out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

/// Shared limiter. Wrap in an `Arc` and hand the same instance to every job.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    log: Mutex<VecDeque<Instant>>,
    total_requests: AtomicU64,
    total_waits: AtomicU64,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Calls to `acquire`.
    pub total_requests: u64,
    /// Times a caller had to sleep because the window was full.
    pub total_waits: u64,
    /// Admissions still inside the current window.
    pub in_window: usize,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            log: Mutex::new(VecDeque::with_capacity(config.max_requests)),
            config,
            total_requests: AtomicU64::new(0),
            total_waits: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until one more request fits in the window, then record it.
    ///
    /// The lock is held only while inspecting the log; sleeping happens
    /// outside it and the check is repeated afterwards, since other callers
    /// may have been admitted in the meantime.
    pub async fn acquire(&self) {
        let request_no = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;
        loop {
            let wait = {
                let mut log = self.log.lock().await;
                let now = Instant::now();
                while log
                    .front()
                    .is_some_and(|&oldest| now.duration_since(oldest) >= self.config.window)
                {
                    log.pop_front();
                }
                let oldest = log.front().copied();
                match oldest {
                    Some(oldest) if log.len() >= self.config.max_requests => {
                        self.config.window.saturating_sub(now.duration_since(oldest))
                            + self.config.margin
                    }
                    _ => {
                        log.push_back(now);
                        return;
                    }
                }
            };
            self.total_waits.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_no,
                wait_ms = wait.as_millis() as u64,
                "rate_limit_wait"
            );
            sleep(wait).await;
        }
    }

    pub async fn stats(&self) -> RateLimitStats {
        let log = self.log.lock().await;
        let now = Instant::now();
        let in_window = log
            .iter()
            .filter(|&&t| now.duration_since(t) < self.config.window)
            .count();
        RateLimitStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_waits: self.total_waits.load(Ordering::Relaxed),
            in_window,
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
