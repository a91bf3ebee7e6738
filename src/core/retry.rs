//! Retry with exponential backoff
//!
//! Async counterpart of a recovery executor: an operation is attempted up to
//! `max_attempts` times, sleeping between attempts with a delay that grows by
//! `backoff_multiplier`. Only errors that report themselves as retryable are
//! attempted again.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    /// Check if error is retryable
    fn is_retryable(&self) -> bool;
}

/// Backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone)]
pub enum RetryFailure<E> {
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error that must not be retried
    NonRetryable { attempts: u32, error: E },
}

impl<E> RetryFailure<E> {
    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Exhausted { attempts, .. } => *attempts,
            RetryFailure::NonRetryable { attempts, .. } => *attempts,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryFailure::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryFailure::NonRetryable { attempts, error } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempts, error)
            }
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps (tests, local fakes)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32 - 1);
        if !factor.is_finite() || factor > 1e6 {
            return self.max_delay;
        }
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Run `operation` under this policy
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    return Err(RetryFailure::NonRetryable {
                        attempts: attempt,
                        error: e,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {}ms...",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
