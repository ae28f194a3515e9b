use serde::{Deserialize, Serialize};
use stackflow_common::deployment::RollbackStrategy;

pub mod default;
mod scheduling;
mod state;
mod util;

pub use default::DeploymentOrchestrator;

/// Knobs of a single `deploy_all` call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeploymentOptions {
    /// Deploy every wave's stacks concurrently instead of one stack at a time.
    pub parallel: bool,

    /// Preview instead of deploying.
    pub dry_run: bool,

    /// Refresh recorded state before each deployment.
    pub refresh: bool,

    /// Keep deploying stacks unrelated to a failure instead of halting the run.
    pub continue_on_failure: bool,

    /// Roll back a stack once its attempts are exhausted.
    pub rollback_on_failure: bool,

    pub rollback_strategy: RollbackStrategy,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            dry_run: false,
            refresh: false,
            continue_on_failure: false,
            rollback_on_failure: false,
            rollback_strategy: RollbackStrategy::Refresh,
        }
    }
}
