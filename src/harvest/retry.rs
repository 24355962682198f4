//! Retry and backoff around adapter invocations

use crate::adapter::AdapterError;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with a cap, applied uniformly to every scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. Returns the final result and the attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T, AdapterError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        jurisdiction = label,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "scrape failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
