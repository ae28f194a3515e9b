use std::{future::Future, time::Duration};

use rand::Rng;
use stackflow_common::{deployment::RecoveryOptions, error::Error};
use tracing::warn;

/// Ceiling applied when a policy does not set its own `max_delay`.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(15 * 60);

/// How many times, and how patiently, a failed operation is attempted again.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Option<Duration>,
    pub jitter: bool,
}

/// Result of running an operation under a `RetryPolicy`.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, Error>,

    /// Retries consumed on top of the first attempt.
    pub retries: u32,
}

impl From<&RecoveryOptions> for RetryPolicy {
    fn from(options: &RecoveryOptions) -> Self {
        Self {
            max_retries: options.effective_max_retries(),
            retry_delay: options.retry_delay(),
            backoff_multiplier: options.backoff_multiplier,
            max_delay: options.max_delay(),
            jitter: options.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `retry_delay * backoff_multiplier^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.max_delay.unwrap_or(DEFAULT_MAX_DELAY);
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        Duration::try_from_secs_f64(secs)
            .unwrap_or(ceiling)
            .min(ceiling)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        delay.mul_f64(rand::rng().random_range(0.5..=1.0))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    /// ---
    /// `op` receives the 1-based attempt number. Non-retryable failures
    /// return at once and consume no retries. Waits between attempts are
    /// timer sleeps, so concurrent callers back off independently.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;

        loop {
            let attempt = retries + 1;

            let err = match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        retries,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(
                    "{}: attempt {} failed with a non-retryable error: {}",
                    operation, attempt, err
                );
                return RetryOutcome {
                    result: Err(err),
                    retries,
                };
            }

            if retries >= self.max_retries {
                warn!(
                    "{}: attempt {} failed, retry budget of {} exhausted: {}",
                    operation, attempt, self.max_retries, err
                );
                return RetryOutcome {
                    result: Err(err),
                    retries,
                };
            }

            let delay = self.jittered(self.delay_for(retries));
            warn!(
                "{}: attempt {} failed, retrying in {:?}: {}",
                operation, attempt, delay, err
            );

            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}
