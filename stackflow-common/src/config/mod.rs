use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::Path,
};

use tracing::{debug, info};

use crate::{deployment::DeploymentConfig, error::Error, stack::StackConfig};

mod interpolate;
mod parser;

pub use interpolate::interpolate;
pub use parser::{ConfigFormat, ParseError, parse_document, parse_json, parse_yaml};

use interpolate::interpolate_in_place;

/// Loads deployment documents into a validated `DeploymentConfig`.
/// ---
/// Placeholder tokens (`${NAME}`) are resolved against the variable set
/// captured when the manager is built, never against the live process
/// environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    variables: HashMap<String, String>,
}

impl ConfigManager {
    pub fn new(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }

    /// Snapshot of the current process environment.
    pub fn from_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    pub fn load_config(&self, path: impl AsRef<Path>) -> Result<DeploymentConfig, Error> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        info!("Loading deployment configuration from {}", path.display());

        self.load_str(&contents, ConfigFormat::from_path(path))
    }

    pub fn load_str(&self, contents: &str, format: ConfigFormat) -> Result<DeploymentConfig, Error> {
        let mut config = parse_document(contents, format)?;

        self.interpolate_config(&mut config)?;
        Self::apply_account_roles(&mut config)?;
        Self::validate(&config)?;

        debug!(
            "Deployment '{}' loaded with {} stacks",
            config.name,
            config.stacks.len()
        );

        Ok(config)
    }

    /// Checks the structural invariants of a configuration.
    /// ---
    /// Cycles are not detected here, they are reported by the dependency resolver.
    pub fn validate(config: &DeploymentConfig) -> Result<(), Error> {
        if config.stacks.is_empty() {
            return Err(Error::Validation(format!(
                "Deployment '{}' declares no stacks",
                config.name
            )));
        }

        let mut names = HashSet::new();

        for (idx, stack) in config.stacks.iter().enumerate() {
            Self::validate_required_fields(idx, stack)?;

            if !names.insert(stack.name.as_str()) {
                return Err(Error::DuplicateStack(stack.name.clone()));
            }
        }

        for stack in &config.stacks {
            for dependency in &stack.dependencies {
                if !names.contains(dependency.as_str()) {
                    return Err(Error::UnknownDependency {
                        stack: stack.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }

            if let Some(account) = &stack.account {
                if !config.accounts.contains_key(account) {
                    return Err(Error::Validation(format!(
                        "Stack '{}' references unknown account '{}'",
                        stack.name, account
                    )));
                }
            }

            if let Some(recovery) = &stack.recovery {
                recovery.validate(&format!("stack '{}'", stack.name))?;
            }
        }

        if let Some(recovery) = &config.recovery {
            recovery.validate(&format!("deployment '{}'", config.name))?;
        }

        Ok(())
    }

    fn validate_required_fields(idx: usize, stack: &StackConfig) -> Result<(), Error> {
        if stack.name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Stack at position {} has a missing or empty name",
                idx
            )));
        }

        for (field, value) in [("workDir", &stack.work_dir), ("stackName", &stack.stack_name)] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "Stack '{}' has a missing or empty '{}'",
                    stack.name, field
                )));
            }
        }

        Ok(())
    }

    fn interpolate_config(&self, config: &mut DeploymentConfig) -> Result<(), Error> {
        for (account_name, account) in config.accounts.iter_mut() {
            let owner = format!("account '{}'", account_name);
            interpolate_in_place(&mut account.account_id, &self.variables, &owner)?;
            interpolate_in_place(&mut account.role_arn, &self.variables, &owner)?;
        }

        for stack in config.stacks.iter_mut() {
            let owner = format!("stack '{}'", stack.name);
            interpolate_in_place(&mut stack.work_dir, &self.variables, &owner)?;
            interpolate_in_place(&mut stack.stack_name, &self.variables, &owner)?;

            if let Some(role_arn) = stack.role_arn.as_mut() {
                interpolate_in_place(role_arn, &self.variables, &owner)?;
            }

            for environment in stack.esc_environments.iter_mut() {
                interpolate_in_place(environment, &self.variables, &owner)?;
            }
        }

        Ok(())
    }

    /// Stacks bound to an account inherit its role unless they name one themselves.
    fn apply_account_roles(config: &mut DeploymentConfig) -> Result<(), Error> {
        for stack in config.stacks.iter_mut() {
            let Some(account_name) = &stack.account else {
                continue;
            };

            let account = config.accounts.get(account_name).ok_or_else(|| {
                Error::Validation(format!(
                    "Stack '{}' references unknown account '{}'",
                    stack.name, account_name
                ))
            })?;

            if stack.role_arn.is_none() {
                stack.role_arn = Some(account.role_arn.clone());
            }
        }

        Ok(())
    }
}
