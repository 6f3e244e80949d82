//! Retry and polling helpers.
//!
//! `with_retry` repeats a single request on transient failures (network
//! errors, HTTP 429 and 5xx) with exponential backoff and full jitter.
//! `poll_until` drives a bounded status-check loop at a fixed interval and
//! always ends with a definitive result.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

use crate::error::{PublishError, PublishResult};
use crate::metrics::{record_poll_attempts, record_retry};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        // Full jitter from the clock's sub-second nanos, floored at base_delay
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let factor = (nanos % 1000) as f64 / 1000.0;
        capped.mul_f64(factor).max(self.base_delay)
    }
}

/// Execute an async request with retry on transient errors.
///
/// Non-retryable errors are returned immediately.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> PublishResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = PublishResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        let span = info_span!("publish_request", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Publish request failed, retrying: {}",
                    e
                );
                record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounded polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of status checks.
    pub max_attempts: u32,
    /// Fixed wait before each check.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

/// One observation of a remote resource that is still being prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Ready to use.
    Ready,
    /// Still processing; carries the remote status for logging.
    Pending(String),
}

/// Poll `check` until it reports `Ready` or fails.
///
/// Waits `interval` before every check. Errors from `check` end the loop
/// immediately; running out of attempts yields
/// [`PublishError::ProcessingTimeout`].
pub async fn poll_until<F, Fut>(config: &PollConfig, mut check: F) -> PublishResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PublishResult<PollStatus>>,
{
    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(config.interval).await;

        match check().await? {
            PollStatus::Ready => {
                record_poll_attempts(attempt);
                return Ok(attempt);
            }
            PollStatus::Pending(status) => {
                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    "Processing... Status: {}",
                    status
                );
            }
        }
    }

    Err(PublishError::ProcessingTimeout {
        attempts: config.max_attempts,
    })
}
