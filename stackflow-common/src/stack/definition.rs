use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deployment::RecoveryOptions;

/// One deployable unit: a Pulumi program plus the stack it targets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    /// Unique key of this stack inside a deployment configuration.
    /// ---
    /// Required, like `work_dir` and `stack_name`. Absent keys default to
    /// empty so that `ConfigManager::validate` reports them by name.
    #[serde(default)]
    pub name: String,

    /// Directory holding the stack's Pulumi program.
    #[serde(default)]
    pub work_dir: String,

    /// Target Pulumi stack identifier (e.g. `org/project/dev`).
    #[serde(default)]
    pub stack_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,

    /// Name of an `accounts` entry whose role is assumed when `role_arn` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Names of stacks that must succeed before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Secret environments attached before every deployment attempt.
    #[serde(default)]
    pub esc_environments: Vec<String>,

    /// Upper bound on a single external call for this stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryOptions>,

    /// Component specs are opaque to the orchestrator and handed to the program as is.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

impl StackConfig {
    pub fn new(
        name: impl Into<String>,
        work_dir: impl Into<String>,
        stack_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            work_dir: work_dir.into(),
            stack_name: stack_name.into(),
            role_arn: None,
            account: None,
            dependencies: Vec::new(),
            esc_environments: Vec::new(),
            timeout_seconds: None,
            recovery: None,
            components: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComponentSpec {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}
