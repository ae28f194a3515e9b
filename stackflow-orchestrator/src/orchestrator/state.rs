use std::collections::{BTreeMap, HashMap};

use stackflow_common::stack::{StackConfig, StackDeploymentResult, StackOutputs, StackStatus};
use tracing::debug;

use crate::resolver::ExecutionPlan;

/// Bookkeeping of one deployment run.
/// ---
/// Only the orchestrating task writes here; concurrent stack deployments
/// return their results, which are recorded once their wave completes.
pub(super) struct RunState {
    stack_states: HashMap<String, StackStatus>,
    results: HashMap<String, StackDeploymentResult>,
    outputs: HashMap<String, StackOutputs>,

    /// Stack whose failure stopped the run, when `continue_on_failure` is off.
    halted_by: Option<String>,
}

impl RunState {
    pub(super) fn new(plan: &ExecutionPlan) -> Self {
        Self {
            stack_states: plan
                .order()
                .iter()
                .map(|name| (name.clone(), StackStatus::Pending))
                .collect(),
            results: HashMap::with_capacity(plan.len()),
            outputs: HashMap::new(),
            halted_by: None,
        }
    }

    pub(super) fn status(&self, stack: &str) -> Option<StackStatus> {
        self.stack_states.get(stack).copied()
    }

    pub(super) fn mark_running(&mut self, stack: &str) {
        self.stack_states
            .insert(stack.to_string(), StackStatus::Running);
    }

    pub(super) fn halt(&mut self, failed_stack: &str) {
        if self.halted_by.is_none() {
            self.halted_by = Some(failed_stack.to_string());
        }
    }

    pub(super) fn is_halted(&self) -> bool {
        self.halted_by.is_some()
    }

    /// Why `stack` must not be started, if it must not.
    /// ---
    /// A failed or skipped dependency takes precedence over a halted run,
    /// so dependents always report the upstream failure.
    pub(super) fn skip_reason(&self, stack: &StackConfig) -> Option<String> {
        for dependency in &stack.dependencies {
            match self.status(dependency) {
                Some(StackStatus::Succeeded) => {}
                Some(status) if status.blocks_dependents() => {
                    return Some(format!("upstream dependency failed: {}", dependency));
                }
                other => {
                    // Plans order dependencies first, so this is only reachable
                    // when a dependency was never scheduled.
                    debug!(
                        "Dependency '{}' of stack '{}' is in state {:?}",
                        dependency, stack.name, other
                    );
                    return Some(format!("upstream dependency not deployed: {}", dependency));
                }
            }
        }

        self.halted_by
            .as_ref()
            .map(|failed| format!("run halted after stack '{}' failed", failed))
    }

    /// Outputs of `stack`'s dependencies, keyed by dependency name.
    pub(super) fn upstream_outputs(&self, stack: &StackConfig) -> BTreeMap<String, StackOutputs> {
        stack
            .dependencies
            .iter()
            .filter_map(|dependency| {
                self.outputs
                    .get(dependency)
                    .map(|outputs| (dependency.clone(), outputs.clone()))
            })
            .collect()
    }

    pub(super) fn record(&mut self, result: StackDeploymentResult) {
        debug_assert!(
            result.status.is_terminal(),
            "stack '{}' recorded in non-terminal state {}",
            result.stack,
            result.status
        );

        let rolled_back = result
            .rollback
            .as_ref()
            .is_some_and(|rollback| rollback.succeeded);

        let state = match result.status {
            StackStatus::Failed if rolled_back => StackStatus::RolledBack,
            status => status,
        };

        if let Some(outputs) = &result.outputs {
            self.outputs.insert(result.stack.clone(), outputs.clone());
        }

        self.stack_states.insert(result.stack.clone(), state);
        self.results.insert(result.stack.clone(), result);
    }

    /// Results in plan order.
    pub(super) fn into_results(mut self, plan: &ExecutionPlan) -> Vec<StackDeploymentResult> {
        plan.order()
            .iter()
            .map(|name| {
                self.results.remove(name).unwrap_or_else(|| {
                    StackDeploymentResult::skipped(name.clone(), "stack was never scheduled")
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use stackflow_common::stack::RollbackOutcome;

    use super::*;
    use crate::resolver::DependencyResolver;

    fn finished(stack: &str, status: StackStatus) -> StackDeploymentResult {
        StackDeploymentResult {
            status,
            skip_reason: None,
            ..StackDeploymentResult::skipped(stack, "")
        }
    }

    fn plan() -> (Vec<StackConfig>, ExecutionPlan) {
        let stacks = vec![
            StackConfig::new("net", "./net", "dev"),
            StackConfig::new("app", "./app", "dev").with_dependencies(["net"]),
            StackConfig::new("dns", "./dns", "dev"),
        ];
        let plan = DependencyResolver::resolve(&stacks).unwrap();
        (stacks, plan)
    }

    #[test]
    fn test_dependency_failure_wins_over_halt() {
        let (stacks, plan) = plan();
        let mut state = RunState::new(&plan);

        state.record(finished("net", StackStatus::Failed));
        state.halt("net");

        assert_eq!(
            state.skip_reason(&stacks[1]).as_deref(),
            Some("upstream dependency failed: net")
        );
        assert_eq!(
            state.skip_reason(&stacks[2]).as_deref(),
            Some("run halted after stack 'net' failed")
        );
    }

    #[test]
    fn test_rolled_back_stack_blocks_dependents() {
        let (stacks, plan) = plan();
        let mut state = RunState::new(&plan);

        state.record(StackDeploymentResult {
            rollback: Some(RollbackOutcome {
                succeeded: true,
                error: None,
            }),
            ..finished("net", StackStatus::Failed)
        });

        assert_eq!(state.status("net"), Some(StackStatus::RolledBack));
        assert!(state.skip_reason(&stacks[1]).is_some());
    }

    #[test]
    fn test_upstream_outputs_only_from_dependencies() {
        let (stacks, plan) = plan();
        let mut state = RunState::new(&plan);

        let outputs = StackOutputs::from([("vpcId".to_string(), serde_json::json!("vpc-123"))]);
        state.record(StackDeploymentResult {
            outputs: Some(outputs.clone()),
            ..finished("net", StackStatus::Succeeded)
        });
        state.record(StackDeploymentResult {
            outputs: Some(StackOutputs::new()),
            ..finished("dns", StackStatus::Succeeded)
        });

        let upstream = state.upstream_outputs(&stacks[1]);
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream["net"], outputs);
        assert_eq!(state.skip_reason(&stacks[1]), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "non-terminal state running")]
    fn test_only_terminal_results_are_recorded() {
        let (_, plan) = plan();
        let mut state = RunState::new(&plan);
        state.record(finished("net", StackStatus::Running));
    }

    #[test]
    fn test_results_follow_plan_order() {
        let (_, plan) = plan();
        let mut state = RunState::new(&plan);
        state.record(finished("dns", StackStatus::Succeeded));
        state.record(finished("net", StackStatus::Succeeded));

        let results = state.into_results(&plan);
        let names: Vec<&str> = results.iter().map(|r| r.stack.as_str()).collect();
        assert_eq!(names, ["net", "app", "dns"]);
        assert_eq!(results[1].status, StackStatus::Skipped);
    }
}
