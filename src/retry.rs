//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient failures.
//! It implements exponential backoff with optional jitter to prevent thundering herd.
//! The HTTP fetcher wraps every transform request in [`with_retry`], so a flaky
//! network hop does not immediately turn a variant into a failed one.
//!
//! # Example
//!
//! ```no_run
//! use offramp_preview::retry::{IsRetryable, with_retry};
//! use offramp_preview::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx, rate limiting) should return `true`.
/// Permanent failures (bad input, malformed payloads) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Delay the remote side asked for before the next attempt, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            // Only server-side statuses; 4xx means the request itself is wrong
            FetchError::Http { status } => *status >= 500,
            FetchError::RateLimited { .. } => true,
            // The service answered and told us the transform failed
            FetchError::Upstream { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// When the error carries a [`retry_after`](IsRetryable::retry_after) hint, that
/// delay (capped at `max_delay`) replaces the backoff delay for the next attempt.
/// The backoff schedule still advances.
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_delay;

    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::debug!(error = %error, "Operation failed with non-retryable error");
            return Err(error);
        }
        if attempt >= config.max_attempts {
            tracing::error!(
                error = %error,
                attempts = attempt + 1,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(error);
        }
        attempt += 1;

        let wait = next_wait(config, backoff, error.retry_after());
        tracing::warn!(
            error = %error,
            attempt = attempt,
            max_attempts = config.max_attempts,
            delay_ms = wait.as_millis(),
            "Operation failed, retrying"
        );
        tokio::time::sleep(wait).await;

        backoff = Duration::from_secs_f64(backoff.as_secs_f64() * config.backoff_multiplier)
            .min(config.max_delay);
    }
}

// A server-requested delay is honored as given (no jitter), up to max_delay
fn next_wait(config: &RetryConfig, backoff: Duration, requested: Option<Duration>) -> Duration {
    match requested {
        Some(requested) => requested.min(config.max_delay),
        None if config.jitter => add_jitter(backoff),
        None => backoff,
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
