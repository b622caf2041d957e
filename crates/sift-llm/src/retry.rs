use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LlmError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

/// Capped exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base << attempt`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Run `f`, retrying retryable failures with backoff.
    ///
    /// Every attempt is bounded by `timeout`; an elapsed timeout is reported as
    /// `LlmError::Timeout` and treated like any other transient failure.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error immediately, or the last error once
    /// `max_attempts` is exhausted.
    pub async fn run<F, Fut, T>(&self, label: &str, timeout: Duration, mut f: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match with_timeout(timeout, f()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            attempt += 1;
            if !err.is_retryable() || attempt >= attempts {
                if attempt > 1 {
                    tracing::warn!(label, attempt, "giving up after retries: {err}");
                }
                return Err(err);
            }
            let delay = self.delay_for(attempt - 1);
            tracing::warn!(
                label,
                attempt,
                max_attempts = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "transient failure, retrying: {err}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Bound a provider future by `timeout`, mapping elapsed time to `LlmError::Timeout`.
///
/// # Errors
///
/// Returns `LlmError::Timeout` when the deadline passes, otherwise the future's own error.
pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Result<T, LlmError>
where
    Fut: Future<Output = Result<T, LlmError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}
