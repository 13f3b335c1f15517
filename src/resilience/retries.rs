//! Caller-level retry across dispatches.
//!
//! # Responsibilities
//! - Decide whether a failed dispatch is worth repeating (`LbError::is_retryable`)
//! - Repeat with exponential backoff + jitter, bounded by `max_attempts`
//!
//! # Design Decisions
//! - Every attempt is a complete, independent dispatch; round robin picks a
//!   fresh endpoint each time
//! - Never retry caller faults (they fail on every endpoint)
//! - Jittered backoff prevents thundering herd

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::LbError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt - 1)).min(max_ms);

        // Apply jitter (0 to 10% of the delay)
        let jitter_range = delay_ms / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached. The attempt number (1-based) is passed in.
    pub async fn retry<T, F, Fut>(&self, mut operation: F) -> Result<T, LbError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LbError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.backoff(attempt);
                    tracing::info!(attempt, delay = ?delay, error = %e, "Retrying dispatch");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
