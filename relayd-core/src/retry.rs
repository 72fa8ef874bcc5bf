//! Retry policy for outbound deliveries.
//!
//! The policy is independent of networking: it drives any async operation
//! whose failures are classified as [`AttemptError::Transient`] (retried
//! after an exponential backoff) or [`AttemptError::Permanent`] (returned
//! immediately).

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum AttemptError<E> {
    Transient(E),
    Permanent(E),
}

/// Final failure of [`RetryPolicy::run`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed transiently; carries the last error.
    Exhausted { attempts: u32, error: E },
    /// An attempt failed permanently.
    Aborted { attempt: u32, error: E },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    /// Effective attempt count. A request is always tried at least once.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `min_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.min_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempts are
    /// used up. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Permanent(error)) => {
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(AttemptError::Transient(error)) if attempt >= attempts => {
                    return Err(RetryError::Exhausted { attempts, error });
                }
                Err(AttemptError::Transient(error)) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
