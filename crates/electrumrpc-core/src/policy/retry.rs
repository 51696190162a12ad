//! Bounded fixed-delay retry for transient failures.
//!
//! Only errors the caller classifies as transient are retried; anything else
//! is returned after the attempt that produced it. The delay between attempts
//! is constant, not exponential.

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

use crate::error::TransportError;

/// Attempts made by [`RetryPolicy::default`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay between attempts made by [`RetryPolicy::default`].
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Fixed delay before each retry.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Stateless retry executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Same delay, different attempt budget.
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            config: RetryConfig {
                max_attempts,
                ..self.config
            },
        }
    }

    /// Same attempt budget, different delay.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            config: RetryConfig {
                delay,
                ..self.config
            },
        }
    }

    /// Total attempts this policy will make, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delays slept between attempts; one fewer than the attempt budget.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.config.delay).take(self.max_attempts() as usize - 1)
    }

    /// Run `operation` until it succeeds, fails with an error for which
    /// `is_retryable` returns `false`, or the attempt budget is spent.
    ///
    /// The last error is returned unchanged.
    pub async fn execute_if<T, E, F, Fut, C>(
        &self,
        operation: F,
        mut is_retryable: C,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0u32;
        RetryIf::spawn(self.delays(), operation, |err: &E| {
            attempt += 1;
            let retry = is_retryable(err);
            if retry && attempt < max_attempts {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = self.config.delay.as_millis() as u64,
                    error = %err,
                    "transient RPC failure, retrying"
                );
            } else if retry {
                tracing::warn!(attempt, error = %err, "retry attempts exhausted");
            }
            retry
        })
        .await
    }

    /// [`execute_if`](Self::execute_if) retrying only
    /// [`TransportError::is_retryable`] errors.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        self.execute_if(operation, TransportError::is_retryable).await
    }
}
