use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stack::StackConfig;

use super::RecoveryOptions;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub account_id: String,
    pub role_arn: String,
}

/// Top-level deployment document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub name: String,

    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,

    /// Default recovery policy for stacks that carry none of their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryOptions>,

    #[serde(default)]
    pub stacks: Vec<StackConfig>,
}

impl DeploymentConfig {
    pub fn new(name: impl Into<String>, stacks: Vec<StackConfig>) -> Self {
        Self {
            name: name.into(),
            accounts: BTreeMap::new(),
            recovery: None,
            stacks,
        }
    }

    pub fn get_stack(&self, name: &str) -> Option<&StackConfig> {
        self.stacks.iter().find(|stack| stack.name == name)
    }
}
