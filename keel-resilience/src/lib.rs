//! Retry support for Keel
//!
//! A [`Retrier`] runs an async operation under a [`RetryPolicy`]: an attempt
//! budget plus a fixed delay between attempts. Errors opt into retries
//! through [`Retryable`].

pub mod retry;

pub use retry::{Retrier, RetryError, RetryPolicy, Retryable};
