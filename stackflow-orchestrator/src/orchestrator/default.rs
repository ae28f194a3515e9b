use std::sync::Arc;

use chrono::Utc;
use stackflow_common::{
    deployer::StackDeployer,
    deployment::{DeploymentConfig, DeploymentSummary, RecoveryOptions},
    error::Error,
    event::{DeploymentEvent, EventType},
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{error, info};
use uuid::Uuid;

use crate::resolver::DependencyResolver;

use super::{DeploymentOptions, state::RunState, util::RunContext};

/// Deploys every stack of a configuration in dependency order.
pub struct DeploymentOrchestrator {
    pub(super) deployer: Arc<dyn StackDeployer>,

    /// Recovery policy for stacks when neither they nor their configuration set one.
    pub(super) default_recovery: RecoveryOptions,
    pub(super) event_tx: Option<mpsc::Sender<DeploymentEvent>>,
}

impl DeploymentOrchestrator {
    pub fn new(deployer: Arc<dyn StackDeployer>, default_recovery: RecoveryOptions) -> Self {
        Self {
            deployer,
            default_recovery,
            event_tx: None,
        }
    }

    /// Progress events of every run are sent to `event_tx`.
    pub fn with_event_sender(mut self, event_tx: mpsc::Sender<DeploymentEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Deploys every stack of `config` and reports what happened to each of them.
    /// ---
    /// Configuration and dependency graph errors are returned before any stack
    /// is touched. Once deployment starts, per-stack failures are retried,
    /// rolled back and recorded in the summary; they never surface as `Err`.
    pub async fn deploy_all(
        &self,
        config: &DeploymentConfig,
        options: &DeploymentOptions,
    ) -> Result<DeploymentSummary, Error> {
        let plan = DependencyResolver::resolve(&config.stacks)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            "Run [{}]: deploying '{}' ({} stacks in {} waves, parallel: {}, dry run: {})",
            run_id,
            config.name,
            plan.len(),
            plan.waves().len(),
            options.parallel,
            options.dry_run
        );

        self.emit(DeploymentEvent::run(
            run_id,
            EventType::RunPlanned,
            Some(plan.order().join(", ")),
        ))
        .await;
        self.emit(DeploymentEvent::run(run_id, EventType::RunStart, None))
            .await;

        let ctx = RunContext::new(run_id, config, options);
        let mut state = RunState::new(&plan);

        if options.parallel {
            self.run_parallel(&ctx, &plan, &mut state).await?;
        } else {
            self.run_sequential(&ctx, &plan, &mut state).await?;
        }

        let summary = DeploymentSummary::new(
            run_id,
            config.name.clone(),
            options.dry_run,
            started_at,
            clock.elapsed(),
            state.into_results(&plan),
        );

        if summary.success {
            info!(
                "Run [{}]: {} of {} stacks succeeded in {:?}",
                run_id, summary.successful_stacks, summary.total_stacks, summary.total_duration
            );
            self.emit(DeploymentEvent::run(run_id, EventType::RunSuccess, None))
                .await;
        } else {
            error!(
                "Run [{}]: {} failed, {} skipped, {} succeeded",
                run_id, summary.failed_stacks, summary.skipped_stacks, summary.successful_stacks
            );
            self.emit(DeploymentEvent::run(
                run_id,
                EventType::RunFailure,
                Some(format!("{} stacks failed", summary.failed_stacks)),
            ))
            .await;
        }

        Ok(summary)
    }
}
