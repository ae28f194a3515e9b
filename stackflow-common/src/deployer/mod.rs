use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    deployment::RollbackStrategy,
    error::Error,
    stack::{StackConfig, StackOutputs},
};

/// Everything a deployer needs to apply (or preview) one stack.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployRequest {
    pub run_id: Uuid,
    pub stack: StackConfig,

    /// Refresh recorded state before applying changes.
    pub refresh: bool,

    /// 1-based attempt number within the current run.
    pub attempt: u32,

    /// Outputs of this stack's dependencies, keyed by dependency name.
    pub upstream_outputs: BTreeMap<String, StackOutputs>,
}

/// Capability to drive the external infrastructure engine for a single stack.
#[async_trait]
pub trait StackDeployer: Send + Sync {
    /// Apply the stack and return its outputs.
    /// ---
    /// Errors for which `Error::is_retryable` is false are never retried.
    async fn deploy(&self, request: &DeployRequest) -> Result<StackOutputs, Error>;

    /// Compute the changes `deploy` would make without applying them.
    /// ---
    /// Returned outputs are whatever the engine can report before apply,
    /// usually the outputs currently recorded for the stack.
    async fn preview(&self, request: &DeployRequest) -> Result<StackOutputs, Error>;

    /// Undo or reconcile a failed deployment.
    async fn rollback(&self, stack: &StackConfig, strategy: RollbackStrategy)
    -> Result<(), Error>;

    /// Attach secret environments to the stack before it is deployed.
    async fn add_secret_environments(
        &self,
        stack: &StackConfig,
        environments: &[String],
    ) -> Result<(), Error>;

    /// Outputs currently recorded for the stack.
    ///
    /// # Default implementation
    /// Reports no outputs. Deployers able to query recorded state should override it.
    async fn stack_outputs(&self, _stack: &StackConfig) -> Result<StackOutputs, Error> {
        Ok(StackOutputs::new())
    }
}
