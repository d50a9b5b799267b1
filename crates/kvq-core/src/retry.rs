//! Bounded retry with pluggable backoff.
//!
//! [`run`] calls an async operation until it succeeds, until it reports a
//! non-retryable failure with [`Failure::Break`], until the [`Backoff`] says
//! the budget is spent, or until shutdown is requested while sleeping.
//! The delay is taken after a failed attempt and before the next one, never
//! before the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::shutdown::Shutdown;

/// Maps a 0-based attempt index to the delay before the next attempt.
/// `None` means the retry budget is exhausted.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Option<Duration>;
}

/// Same delay every time, for at most `max_attempts` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Backoff for LinearBackoff {
    fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.delay)
    }
}

/// `base_delay * multiplier^attempt`, for at most `max_attempts` retries.
///
/// Example with base_delay=2s, multiplier=2.0:
/// - attempt 0 (first failure): 2s
/// - attempt 1: 4s
/// - attempt 2: 8s
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn default_policy() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }
}

/// Failure reported by one attempt.
#[derive(Debug)]
pub enum Failure<E> {
    /// Try again if the backoff allows it.
    Retry(E),
    /// Stop now and surface the inner error.
    Break(E),
}

impl<E> From<E> for Failure<E> {
    fn from(err: E) -> Self {
        Failure::Retry(err)
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The last error, after a break or an exhausted budget.
    #[error("{0}")]
    Failed(E),

    #[error("retry cancelled by shutdown")]
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Failed(err) => Some(err),
            RetryError::Cancelled => None,
        }
    }
}

/// Run `op` under `backoff`. `name` only labels the log events.
pub async fn run<T, E, F, Fut, B>(
    shutdown: &Shutdown,
    name: &str,
    backoff: &B,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    B: Backoff + ?Sized,
    E: Display,
{
    debug!(name, "started retry");
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => {
                debug!(name, attempt, "completed retry");
                return Ok(value);
            }
            Err(Failure::Break(err)) => {
                info!(name, attempt, error = %err, "break retry");
                return Err(RetryError::Failed(err));
            }
            Err(Failure::Retry(err)) => err,
        };

        warn!(name, attempt, error = %err, "retry got err");
        let Some(delay) = backoff.delay(attempt) else {
            error!(name, attempt, error = %err, "stopped retry");
            return Err(RetryError::Failed(err));
        };

        debug!(name, attempt, ?delay, "retry sleep");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
        }
        attempt += 1;
    }
}
