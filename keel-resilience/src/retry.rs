//! Bounded retries around a fallible async operation

use log::{debug, info, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt budget plus the fixed pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included
    pub max_attempts: u32,

    /// Sleep after each failed attempt that will be retried
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Failure classification consulted after every attempt
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Why a retried operation gave up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: E,
    },

    /// An attempt failed with an error that must not be retried
    #[error("{operation} failed on attempt {attempt}: {error}")]
    Rejected {
        operation: String,
        attempt: u32,
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Attempts made, the failing one included
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Rejected { attempt, .. } => *attempt,
        }
    }

    /// The error of the final attempt
    pub fn into_error(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Rejected { error, .. } => error,
        }
    }
}

/// Runs an operation until it succeeds, fails permanently, or the policy's
/// attempt budget is spent. Sleeps use `tokio::time`, so paused-clock tests
/// observe the schedule without waiting.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    /// A zero attempt budget is treated as one attempt
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
        }
    }

    /// Run `op`, passing the 1-based attempt number
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            debug!("{}: attempt {}/{}", operation, attempt, max_attempts);

            let error = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{}: succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(RetryError::Rejected {
                    operation: operation.to_string(),
                    attempt,
                    error,
                });
            }

            if attempt >= max_attempts {
                warn!("{}: giving up after {} attempts: {}", operation, attempt, error);
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: error,
                });
            }

            warn!(
                "{}: attempt {} failed ({}), retrying in {:?}",
                operation, attempt, error, self.policy.delay
            );
            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }
}
