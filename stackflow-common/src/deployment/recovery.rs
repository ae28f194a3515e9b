use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::Error;

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    /// Retry with backoff, then give up.
    Retry,
    /// Never retry.
    FailFast,
    /// Retry with backoff, then roll the stack back.
    Rollback,
}

/// Compensating action taken on a stack whose deployment failed.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStrategy {
    /// Tear down every resource the stack owns.
    Destroy,
    /// Reconcile recorded state with what actually exists in the cloud.
    Refresh,
}

/// Per-operation failure policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOptions {
    #[serde(default = "RecoveryOptions::default_strategy")]
    pub strategy: RecoveryStrategy,

    #[serde(default = "RecoveryOptions::default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds.
    #[serde(default = "RecoveryOptions::default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "RecoveryOptions::default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Cap on a single backoff delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<u64>,

    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    #[serde(default)]
    pub jitter: bool,
}

impl RecoveryOptions {
    fn default_strategy() -> RecoveryStrategy {
        RecoveryStrategy::Retry
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_retry_delay() -> u64 {
        5_000
    }

    fn default_backoff_multiplier() -> f64 {
        2.0
    }

    pub fn fail_fast() -> Self {
        Self {
            strategy: RecoveryStrategy::FailFast,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retries actually granted by the strategy.
    pub fn effective_max_retries(&self) -> u32 {
        match self.strategy {
            RecoveryStrategy::FailFast => 0,
            RecoveryStrategy::Retry | RecoveryStrategy::Rollback => self.max_retries,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay.map(Duration::from_millis)
    }

    pub fn rolls_back(&self) -> bool {
        self.strategy == RecoveryStrategy::Rollback
    }

    pub fn validate(&self, owner: &str) -> Result<(), Error> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Validation(format!(
                "{}: backoffMultiplier must be a finite number >= 1, got {}",
                owner, self.backoff_multiplier
            )));
        }

        if let Some(max_delay) = self.max_delay {
            if max_delay < self.retry_delay {
                return Err(Error::Validation(format!(
                    "{}: maxDelay ({}ms) is smaller than retryDelay ({}ms)",
                    owner, max_delay, self.retry_delay
                )));
            }
        }

        Ok(())
    }
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            strategy: Self::default_strategy(),
            max_retries: Self::default_max_retries(),
            retry_delay: Self::default_retry_delay(),
            backoff_multiplier: Self::default_backoff_multiplier(),
            max_delay: None,
            jitter: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_fail_fast_grants_no_retries() {
        let options = RecoveryOptions {
            strategy: RecoveryStrategy::FailFast,
            max_retries: 5,
            ..RecoveryOptions::default()
        };
        assert_eq!(options.effective_max_retries(), 0);
        assert!(!options.rolls_back());
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let options = RecoveryOptions {
            backoff_multiplier: 0.5,
            ..RecoveryOptions::default()
        };
        assert!(matches!(
            options.validate("stack 'net'"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rollback_strategy_parses_case_insensitively() {
        assert_eq!(
            RollbackStrategy::from_str("destroy").unwrap(),
            RollbackStrategy::Destroy
        );
        assert_eq!(RollbackStrategy::Refresh.to_string(), "REFRESH");
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let options: RecoveryOptions =
            serde_json::from_str(r#"{"strategy":"ROLLBACK","maxRetries":1}"#).unwrap();
        assert_eq!(options.strategy, RecoveryStrategy::Rollback);
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.retry_delay(), Duration::from_secs(5));
        assert_eq!(options.backoff_multiplier, 2.0);
    }
}
