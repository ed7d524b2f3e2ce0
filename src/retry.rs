//! Bounded retry with exponential backoff.
//!
//! Only connection faults are retried. Validation errors, store errors and
//! replica-sync shortfalls go straight back to the caller.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX).min(30);
        let ms = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
        let capped = ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Callbacks fired after every attempt.
pub trait RetryObserver: Send + Sync {
    fn on_success(&self, _attempt: u32) {}
    fn on_failure(&self, _attempt: u32, _error: &Error) {}
}

impl RetryObserver for () {}

/// Runs `op` until it succeeds, fails with a non-connection error, or
/// `policy.max_attempts` is used up. Attempts are numbered from 1.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                observer.on_success(attempt);
                return Ok(value);
            }
            Err(e) => {
                observer.on_failure(attempt, &e);
                if !e.is_connection_fault() || attempt >= policy.max_attempts {
                    return Err(e);
                }
                let delay = policy.delay(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
