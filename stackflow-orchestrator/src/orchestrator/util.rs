use std::collections::HashMap;

use stackflow_common::{
    deployment::{DeploymentConfig, RecoveryOptions},
    error::Error,
    event::DeploymentEvent,
    stack::StackConfig,
};
use tracing::debug;
use uuid::Uuid;

use super::{DeploymentOptions, default::DeploymentOrchestrator};

/// Read-only inputs shared by every stack of one run.
pub(super) struct RunContext<'a> {
    pub run_id: Uuid,
    pub config: &'a DeploymentConfig,
    pub options: &'a DeploymentOptions,
    stacks_by_name: HashMap<&'a str, &'a StackConfig>,
}

impl<'a> RunContext<'a> {
    pub fn new(run_id: Uuid, config: &'a DeploymentConfig, options: &'a DeploymentOptions) -> Self {
        Self {
            run_id,
            config,
            options,
            stacks_by_name: config
                .stacks
                .iter()
                .map(|stack| (stack.name.as_str(), stack))
                .collect(),
        }
    }

    pub fn stack(&self, name: &str) -> Result<&'a StackConfig, Error> {
        self.stacks_by_name.get(name).copied().ok_or_else(|| {
            Error::Internal(format!(
                "Stack '{}' is in the execution plan but not in deployment '{}'",
                name, self.config.name
            ))
        })
    }
}

impl DeploymentOrchestrator {
    /// Stack override, then the configuration's default, then the orchestrator's.
    pub(super) fn recovery_for<'a>(
        &'a self,
        config: &'a DeploymentConfig,
        stack: &'a StackConfig,
    ) -> &'a RecoveryOptions {
        stack
            .recovery
            .as_ref()
            .or(config.recovery.as_ref())
            .unwrap_or(&self.default_recovery)
    }

    pub(super) async fn emit(&self, event: DeploymentEvent) {
        if let Some(event_tx) = &self.event_tx {
            if event_tx.send(event).await.is_err() {
                debug!("Deployment event receiver dropped, event discarded");
            }
        }
    }
}
