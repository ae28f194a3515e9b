use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Raw outputs of a deployed stack, keyed by output name.
pub type StackOutputs = BTreeMap<String, serde_json::Value>;

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[strum(serialize = "rolled_back")]
    RolledBack,
    Skipped,
}

impl StackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StackStatus::Succeeded
                | StackStatus::Failed
                | StackStatus::RolledBack
                | StackStatus::Skipped
        )
    }

    /// Dependents of a stack in one of these states can never start.
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            StackStatus::Failed | StackStatus::RolledBack | StackStatus::Skipped
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RollbackOutcome {
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Final record of one stack within a deployment run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StackDeploymentResult {
    pub stack: String,
    pub status: StackStatus,
    pub duration: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Retries consumed on top of the first attempt.
    pub retries: u32,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub rollback: Option<RollbackOutcome>,
    pub outputs: Option<StackOutputs>,
}

impl StackDeploymentResult {
    pub fn skipped(stack: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            status: StackStatus::Skipped,
            duration: Duration::ZERO,
            started_at: None,
            finished_at: None,
            retries: 0,
            error: None,
            skip_reason: Some(reason.into()),
            rollback: None,
            outputs: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self.status {
            StackStatus::Skipped | StackStatus::Pending => 0,
            _ => self.retries + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(StackStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StackStatus::RolledBack.to_string(), "rolled_back");
        assert_eq!(
            StackStatus::from_str("skipped").unwrap(),
            StackStatus::Skipped
        );
    }

    #[test]
    fn test_skipped_result_has_no_attempts() {
        let result = StackDeploymentResult::skipped("app", "upstream dependency failed");
        assert_eq!(result.status, StackStatus::Skipped);
        assert_eq!(result.attempts(), 0);
        assert!(!StackStatus::Succeeded.blocks_dependents());
        assert!(result.status.blocks_dependents());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StackStatus::Pending.is_terminal());
        assert!(!StackStatus::Running.is_terminal());
        assert!(StackStatus::RolledBack.is_terminal());
        assert!(StackStatus::Skipped.is_terminal());
    }
}
