//! Retry configuration, delay calculation, and the retry coordinator.
//!
//! [`RetryCoordinator`] runs an async operation in an explicit loop,
//! retrying transient failures (as classified by
//! [`GatewayError::is_transient()`]) with a growing backoff. A `429`
//! overrides the backoff: the next attempt waits for the provider's
//! `Retry-After` hint, or [`RetryConfig::rate_limit_wait`] when the
//! response carried none.
//!
//! Client errors other than 429 are terminal and returned after a single
//! attempt.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::warn;

use crate::telemetry;
use crate::{GatewayError, Result};

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// `base_delay * n` before retry `n`.
    #[default]
    Linear,
    /// `base_delay * 2^(n-1)` before retry `n`.
    Exponential,
}

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use tidewire::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(3)
///     .base_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_retry(2), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    /// Default: 2.
    pub max_retries: u32,
    /// Base delay, scaled per retry by [`Backoff`]. Default: 1s.
    pub base_delay: Duration,
    /// Backoff growth. Default: linear.
    pub backoff: Backoff,
    /// Cap on computed backoff delays. Default: 30s.
    /// Does not apply to rate-limit waits.
    pub max_delay: Duration,
    /// Wait after a 429 without `Retry-After`. Default: 60s.
    pub rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1_000),
            backoff: Backoff::Linear,
            max_delay: Duration::from_secs(30),
            rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new config with the stock defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the first attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base backoff delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff growth.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the cap on computed backoff delays.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the wait used after a 429 without `Retry-After`.
    pub fn rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry `retry` (1-based), ignoring rate limits.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(retry),
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(retry - 1)),
        };
        delay.min(self.max_delay)
    }

    /// Delay before retry `retry` after `error`.
    ///
    /// A rate-limit error waits for its `Retry-After` hint (or
    /// `rate_limit_wait`) instead of the backoff formula.
    pub fn effective_delay(&self, retry: u32, error: &GatewayError) -> Duration {
        match error {
            GatewayError::RateLimited { retry_after } => {
                retry_after.unwrap_or(self.rate_limit_wait)
            }
            _ => self.delay_for_retry(retry),
        }
    }
}

/// Local retry counters, readable without a metrics recorder.
#[derive(Debug, Default)]
pub struct RetryStats {
    attempts: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time copy of [`RetryStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryStatsSnapshot {
    /// Every call of the wrapped operation.
    pub attempts: u64,
    /// Attempts after the first.
    pub retries: u64,
    /// Calls that ran out of retries on a transient error.
    pub exhausted: u64,
    /// Failures answered with a caller-supplied fallback value.
    pub fallbacks: u64,
}

impl RetryStats {
    /// Copy the current counters.
    pub fn snapshot(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an async operation with retry logic.
///
/// Transient errors are retried up to `config.max_retries` times with the
/// configured backoff; permanent errors are returned immediately. No delay
/// precedes the first attempt.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    stats: &RetryStats,
    service: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 1;
    loop {
        stats.attempts.fetch_add(1, Ordering::Relaxed);
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = config.effective_delay(attempt, &e);
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "service" => service.to_owned(),
                    "operation" => operation.to_owned(),
                )
                .increment(1);
                stats.retries.fetch_add(1, Ordering::Relaxed);
                warn!(
                    service,
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    metrics::counter!(telemetry::RETRY_EXHAUSTED_TOTAL,
                        "service" => service.to_owned(),
                        "operation" => operation.to_owned(),
                    )
                    .increment(1);
                    stats.exhausted.fetch_add(1, Ordering::Relaxed);
                }
                return Err(e);
            }
        }
    }
}

// ============================================================================
// RetryCoordinator
// ============================================================================

/// Runs operations under a [`RetryConfig`] and keeps shared counters.
///
/// Cheap to clone; clones share the same [`RetryStats`].
#[derive(Debug, Clone, Default)]
pub struct RetryCoordinator {
    stats: Arc<RetryStats>,
}

impl RetryCoordinator {
    /// Create a coordinator with fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with retries. Returns the last error once retries are spent.
    pub async fn call<F, Fut, T>(
        &self,
        config: &RetryConfig,
        service: &str,
        operation: &str,
        f: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(config, &self.stats, service, operation, f).await
    }

    /// Run `f` with retries, answering any final failure with `fallback`
    /// when one is supplied.
    pub async fn call_with_fallback<F, Fut, T>(
        &self,
        config: &RetryConfig,
        service: &str,
        operation: &str,
        fallback: Option<T>,
        f: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self.call(config, service, operation, f).await;
        self.recover(outcome, fallback, service)
    }

    /// Replace an error with `fallback`, if there is one.
    pub(crate) fn recover<T>(&self, outcome: Result<T>, fallback: Option<T>, service: &str) -> Result<T> {
        match (outcome, fallback) {
            (Ok(value), _) => Ok(value),
            (Err(e), Some(value)) => {
                warn!(service, error = %e, "returning fallback value");
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> RetryStatsSnapshot {
        self.stats.snapshot()
    }
}
