use std::{collections::BTreeMap, future::Future};

use chrono::Utc;
use futures::future::join_all;
use stackflow_common::{
    deployer::DeployRequest,
    error::Error,
    event::{DeploymentEvent, EventType},
    stack::{RollbackOutcome, StackConfig, StackDeploymentResult, StackOutputs, StackStatus},
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{resolver::ExecutionPlan, retry::RetryPolicy};

use super::{default::DeploymentOrchestrator, state::RunState, util::RunContext};

impl DeploymentOrchestrator {
    /// Deploys one stack at a time, in plan order.
    pub(super) async fn run_sequential(
        &self,
        ctx: &RunContext<'_>,
        plan: &ExecutionPlan,
        state: &mut RunState,
    ) -> Result<(), Error> {
        for name in plan.order() {
            let stack = ctx.stack(name)?;

            if let Some(reason) = state.skip_reason(stack) {
                self.skip_stack(ctx, stack, reason, state).await;
                continue;
            }

            state.mark_running(&stack.name);
            let upstream_outputs = state.upstream_outputs(stack);

            let result = self.deploy_stack(ctx, stack, upstream_outputs).await;
            self.record_result(ctx, result, state).await;
        }

        Ok(())
    }

    /// Deploys each wave's stacks concurrently.
    /// ---
    /// A wave starts only after every member of the previous wave has
    /// reached a terminal state.
    pub(super) async fn run_parallel(
        &self,
        ctx: &RunContext<'_>,
        plan: &ExecutionPlan,
        state: &mut RunState,
    ) -> Result<(), Error> {
        let wave_count = plan.waves().len();

        for (wave_idx, wave) in plan.waves().iter().enumerate() {
            let mut launches = Vec::with_capacity(wave.len());

            for name in wave {
                let stack = ctx.stack(name)?;

                if let Some(reason) = state.skip_reason(stack) {
                    self.skip_stack(ctx, stack, reason, state).await;
                    continue;
                }

                state.mark_running(&stack.name);
                launches.push((stack, state.upstream_outputs(stack)));
            }

            if launches.is_empty() {
                continue;
            }

            info!(
                "Run [{}]: wave {}/{} deploying {} stacks concurrently",
                ctx.run_id,
                wave_idx + 1,
                wave_count,
                launches.len()
            );
            self.emit(DeploymentEvent::run(
                ctx.run_id,
                EventType::WaveStart,
                Some(format!("wave {}/{}", wave_idx + 1, wave_count)),
            ))
            .await;

            let results = join_all(
                launches
                    .into_iter()
                    .map(|(stack, upstream_outputs)| self.deploy_stack(ctx, stack, upstream_outputs)),
            )
            .await;

            for result in results {
                self.record_result(ctx, result, state).await;
            }
        }

        Ok(())
    }

    async fn record_result(
        &self,
        ctx: &RunContext<'_>,
        result: StackDeploymentResult,
        state: &mut RunState,
    ) {
        let failed_stack = (result.status == StackStatus::Failed).then(|| result.stack.clone());
        state.record(result);

        let Some(failed_stack) = failed_stack else {
            return;
        };

        if !ctx.options.continue_on_failure && !state.is_halted() {
            warn!(
                "Run [{}]: stack '{}' failed, no further stacks will be started",
                ctx.run_id, failed_stack
            );
            state.halt(&failed_stack);
            self.emit(DeploymentEvent::stack(
                ctx.run_id,
                &failed_stack,
                EventType::RunHalted,
                None,
                None,
            ))
            .await;
        }
    }

    async fn skip_stack(
        &self,
        ctx: &RunContext<'_>,
        stack: &StackConfig,
        reason: String,
        state: &mut RunState,
    ) {
        warn!(
            "Run [{}]: skipping stack '{}': {}",
            ctx.run_id, stack.name, reason
        );
        self.emit(DeploymentEvent::stack(
            ctx.run_id,
            &stack.name,
            EventType::StackSkipped,
            None,
            Some(reason.clone()),
        ))
        .await;

        state.record(StackDeploymentResult::skipped(&stack.name, reason));
    }

    /// Runs a stack to a terminal state: attempts under its retry policy,
    /// then a rollback if the attempts are exhausted and rollback is requested.
    async fn deploy_stack(
        &self,
        ctx: &RunContext<'_>,
        stack: &StackConfig,
        upstream_outputs: BTreeMap<String, StackOutputs>,
    ) -> StackDeploymentResult {
        let recovery = self.recovery_for(ctx.config, stack);
        let policy = RetryPolicy::from(recovery);

        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            "Run [{}]: stack '{}' ({}) starting{}",
            ctx.run_id,
            stack.name,
            stack.stack_name,
            if ctx.options.dry_run { " in preview mode" } else { "" }
        );
        self.emit(DeploymentEvent::stack(
            ctx.run_id,
            &stack.name,
            EventType::StackStart,
            Some(1),
            None,
        ))
        .await;

        let request = DeployRequest {
            run_id: ctx.run_id,
            stack: stack.clone(),
            refresh: ctx.options.refresh,
            attempt: 1,
            upstream_outputs,
        };

        let operation = format!("Run [{}]: stack '{}'", ctx.run_id, stack.name);
        let outcome = policy
            .execute(&operation, |attempt| {
                let request = &request;
                async move {
                    if attempt > 1 {
                        self.emit(DeploymentEvent::stack(
                            ctx.run_id,
                            &request.stack.name,
                            EventType::StackRetrying,
                            Some(attempt),
                            None,
                        ))
                        .await;
                    }
                    self.attempt_stack(ctx, request, attempt).await
                }
            })
            .await;

        let mut result = StackDeploymentResult {
            stack: stack.name.clone(),
            status: StackStatus::Succeeded,
            duration: clock.elapsed(),
            started_at: Some(started_at),
            finished_at: None,
            retries: outcome.retries,
            error: None,
            skip_reason: None,
            rollback: None,
            outputs: None,
        };

        match outcome.result {
            Ok(outputs) => {
                info!(
                    "Run [{}]: stack '{}' succeeded after {} attempt(s) with {} outputs",
                    ctx.run_id,
                    stack.name,
                    outcome.retries + 1,
                    outputs.len()
                );
                self.emit(DeploymentEvent::stack(
                    ctx.run_id,
                    &stack.name,
                    EventType::StackSuccess,
                    Some(outcome.retries + 1),
                    None,
                ))
                .await;

                result.outputs = Some(outputs);
            }
            Err(err) => {
                error!(
                    "Run [{}]: stack '{}' failed after {} attempt(s): {}",
                    ctx.run_id,
                    stack.name,
                    outcome.retries + 1,
                    err
                );
                self.emit(DeploymentEvent::stack(
                    ctx.run_id,
                    &stack.name,
                    EventType::StackFailure,
                    Some(outcome.retries + 1),
                    Some(err.to_string()),
                ))
                .await;

                let wants_rollback = ctx.options.rollback_on_failure || recovery.rolls_back();
                if wants_rollback && !ctx.options.dry_run {
                    result.rollback = Some(self.rollback_stack(ctx, stack).await);
                }

                result.status = StackStatus::Failed;
                result.error = Some(err.to_string());
            }
        }

        result.duration = clock.elapsed();
        result.finished_at = Some(Utc::now());
        result
    }

    /// One attempt: attach secret environments, then deploy (or preview).
    async fn attempt_stack(
        &self,
        ctx: &RunContext<'_>,
        request: &DeployRequest,
        attempt: u32,
    ) -> Result<StackOutputs, Error> {
        let stack = &request.stack;

        if !stack.esc_environments.is_empty() {
            debug!(
                "Run [{}]: attaching environments {:?} to stack '{}'",
                ctx.run_id, stack.esc_environments, stack.name
            );
            self.emit(DeploymentEvent::stack(
                ctx.run_id,
                &stack.name,
                EventType::StackAttachEnvironments,
                Some(attempt),
                Some(stack.esc_environments.join(", ")),
            ))
            .await;

            with_timeout(
                stack,
                "attaching secret environments",
                self.deployer
                    .add_secret_environments(stack, &stack.esc_environments),
            )
            .await?;
        }

        let mut request = request.clone();
        request.attempt = attempt;

        if ctx.options.dry_run {
            with_timeout(stack, "preview", self.deployer.preview(&request)).await
        } else {
            with_timeout(stack, "deployment", self.deployer.deploy(&request)).await
        }
    }

    async fn rollback_stack(&self, ctx: &RunContext<'_>, stack: &StackConfig) -> RollbackOutcome {
        let strategy = ctx.options.rollback_strategy;

        warn!(
            "Run [{}]: rolling back stack '{}' ({})",
            ctx.run_id, stack.name, strategy
        );
        self.emit(DeploymentEvent::stack(
            ctx.run_id,
            &stack.name,
            EventType::StackRollbackStart,
            None,
            Some(strategy.to_string()),
        ))
        .await;

        match with_timeout(stack, "rollback", self.deployer.rollback(stack, strategy)).await {
            Ok(()) => {
                info!("Run [{}]: stack '{}' rolled back", ctx.run_id, stack.name);
                self.emit(DeploymentEvent::stack(
                    ctx.run_id,
                    &stack.name,
                    EventType::StackRolledBack,
                    None,
                    None,
                ))
                .await;

                RollbackOutcome {
                    succeeded: true,
                    error: None,
                }
            }
            Err(err) => {
                let err = match err {
                    Error::Rollback { .. } => err,
                    other => Error::Rollback {
                        stack: stack.name.clone(),
                        message: other.to_string(),
                    },
                };

                error!("Run [{}]: {}", ctx.run_id, err);
                self.emit(DeploymentEvent::stack(
                    ctx.run_id,
                    &stack.name,
                    EventType::StackRollbackFailure,
                    None,
                    Some(err.to_string()),
                ))
                .await;

                RollbackOutcome {
                    succeeded: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

/// Bounds `call` by the stack's `timeout_seconds`, if it has one.
async fn with_timeout<T>(
    stack: &StackConfig,
    operation: &str,
    call: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match stack.timeout() {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            Error::Timeout(format!(
                "stack '{}': {} exceeded {:?}",
                stack.name, operation, limit
            ))
        })?,
        None => call.await,
    }
}
