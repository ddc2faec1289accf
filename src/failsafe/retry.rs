//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::debug;

use crate::config::{MAX_DISPATCH_ATTEMPTS, RetryConfig};
use crate::error::DispatchError;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether retries are enabled
    pub enabled: bool,
    /// Maximum attempts, first call included (never above 3)
    pub max_attempts: u32,
    /// Initial backoff
    pub initial_backoff: Duration,
    /// Maximum backoff
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f32,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.clamp(1, MAX_DISPATCH_ATTEMPTS),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Attempts that will actually be made
    #[must_use]
    pub fn effective_attempts(&self) -> u32 {
        if self.enabled { self.max_attempts } else { 1 }
    }

    /// Create an exponential backoff builder
    #[must_use]
    pub fn create_backoff(&self) -> ExponentialBuilder {
        let retries = self.effective_attempts().saturating_sub(1);
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(self.multiplier)
            .with_max_times(retries as usize)
    }
}

/// Execute a future with retry logic
///
/// Only `RateLimited` and `ServiceUnavailable` are retried.
///
/// # Errors
///
/// Returns the last error from `f` if all attempts are exhausted or the
/// error is not retryable.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    name: &str,
    f: F,
) -> Result<T, DispatchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    f.retry(policy.create_backoff())
        .when(DispatchError::is_retryable)
        .notify(|e: &DispatchError, delay: Duration| {
            debug!(
                operation = name,
                delay_ms = delay.as_millis(),
                error = %e,
                "Retrying after backoff"
            );
        })
        .await
}
