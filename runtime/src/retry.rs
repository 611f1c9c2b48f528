//! Fixed-delay retry for transient balance store and event stream failures.
//!
//! The same helper wraps balance loads, balance persistence and event emission. It knows
//! nothing about entities: it attempts an operation, logs every failed attempt with its
//! ordinal, waits a fixed delay and tries again until the attempt budget is spent. The
//! final failure is surfaced as a typed [`RetryError`].
//!
//! # Example
//!
//! ```rust
//! use account_entity_runtime::retry::{RetryPolicy, retry_with_fixed_delay};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .delay(Duration::from_millis(100))
//!     .build();
//!
//! let result = retry_with_fixed_delay(&policy, "persist_balance", || async {
//!     // Your fallible operation here
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::metrics::RetryMetrics;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Total attempts made before giving up.
pub const MAX_RETRIES: u32 = 3;

/// Delay between two attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry policy configuration.
///
/// # Default Values
///
/// - `max_attempts`: [`MAX_RETRIES`] (3)
/// - `delay`: [`RETRY_DELAY`] (1 second)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Fixed delay before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            delay: None,
        }
    }

    /// Policy that tries exactly once.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    #[must_use]
    pub fn max_total_delay(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    delay: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set total attempts. Zero is treated as one.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set delay between attempts.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(MAX_RETRIES).max(1),
            delay: self.delay.unwrap_or(RETRY_DELAY),
        }
    }
}

/// All attempts failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed after {attempts} attempts: {last_error}")]
pub struct RetryError<E> {
    /// Name of the operation, as passed to the helper.
    pub operation: &'static str,
    /// Attempts made.
    pub attempts: u32,
    /// Error from the last attempt.
    pub last_error: E,
}

/// Retry an async operation with a fixed delay between attempts.
///
/// # Arguments
///
/// * `policy` - Attempt budget and delay
/// * `operation_name` - Label used in logs and metrics
/// * `operation` - Async operation to retry (must be `FnMut` to allow multiple calls)
///
/// # Errors
///
/// Returns [`RetryError`] holding the last error once `policy.max_attempts`
/// attempts have failed. No delay follows the last attempt.
pub async fn retry_with_fixed_delay<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                    RetryMetrics::record_success(operation_name);
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Operation failed after max attempts"
                    );
                    RetryMetrics::record_exhausted(operation_name);
                    return Err(RetryError {
                        operation: operation_name,
                        attempts: attempt,
                        last_error: err,
                    });
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = policy.delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );
                RetryMetrics::record_attempt(operation_name);

                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
