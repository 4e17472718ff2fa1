//! Retry and backoff policies for Keepsake storage backends
//!
//! Storage backends wrap their raw I/O calls in [`retry`]. Errors are classified
//! through [`Retryable`]; only transient errors are retried, and the delay between
//! attempts follows an exponential backoff awaited on the tokio timer.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of an operation that could not be completed under its retry policy
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("operation '{operation}' gave up after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        attempts: usize,
        last: E,
    },
    #[error("operation '{operation}' failed permanently on attempt {attempt}: {last}")]
    Permanent {
        operation: &'static str,
        attempt: usize,
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The error returned by the final attempt
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } | Self::Permanent { last, .. } => last,
        }
    }

    /// Number of attempts made before giving up
    pub fn attempts(&self) -> usize {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Permanent { attempt, .. } => *attempt,
        }
    }
}

/// Classifies errors as worth retrying or not
pub trait Retryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl Retryable for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
        )
    }
}

/// Attempt budget plus exponential delay schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// Policy with the given attempt budget and local-storage delays
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::local_storage()
        }
    }

    /// Short delays suited to local filesystem I/O
    pub fn local_storage() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::local_storage()
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Decide what happens after a failed attempt: `Ok(delay)` to retry, `Err` to stop
    fn after_failure<E: Retryable + Display>(
        &self,
        operation: &'static str,
        attempt: usize,
        err: E,
        schedule: &mut ExponentialBackoff,
    ) -> Result<Duration, RetryError<E>> {
        if err.is_permanent() {
            debug!(operation, attempt, error = %err, "permanent failure, not retrying");
            return Err(RetryError::Permanent {
                operation,
                attempt,
                last: err,
            });
        }
        match schedule.next_backoff() {
            Some(delay) if attempt < self.max_attempts => {
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                Ok(delay)
            }
            _ => Err(RetryError::Exhausted {
                operation,
                attempts: attempt,
                last: err,
            }),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::local_storage()
    }
}

/// Run an async operation under `policy`, awaiting a timer between attempts.
pub async fn retry<T, E, F, Fut>(
    operation: &'static str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut schedule = policy.backoff();
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let delay = policy.after_failure(operation, attempt, err, &mut schedule)?;
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
