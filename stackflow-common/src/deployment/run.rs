use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stack::{StackDeploymentResult, StackStatus};

/// Aggregate of every stack result of one `deploy_all` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub run_id: Uuid,
    pub config_name: String,
    pub dry_run: bool,
    pub total_stacks: usize,
    pub successful_stacks: usize,
    pub failed_stacks: usize,
    pub skipped_stacks: usize,
    pub total_duration: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// One entry per stack, in execution plan order.
    pub results: Vec<StackDeploymentResult>,
    pub success: bool,
}

impl DeploymentSummary {
    pub fn new(
        run_id: Uuid,
        config_name: String,
        dry_run: bool,
        started_at: DateTime<Utc>,
        total_duration: Duration,
        results: Vec<StackDeploymentResult>,
    ) -> Self {
        let count = |status: StackStatus| results.iter().filter(|r| r.status == status).count();

        let successful_stacks = count(StackStatus::Succeeded);
        let failed_stacks = count(StackStatus::Failed) + count(StackStatus::RolledBack);
        let skipped_stacks = count(StackStatus::Skipped);

        Self {
            run_id,
            config_name,
            dry_run,
            total_stacks: results.len(),
            successful_stacks,
            failed_stacks,
            skipped_stacks,
            total_duration,
            started_at,
            finished_at: Utc::now(),
            success: failed_stacks == 0,
            results,
        }
    }

    pub fn result(&self, stack: &str) -> Option<&StackDeploymentResult> {
        self.results.iter().find(|result| result.stack == stack)
    }

    /// Stacks that were actually handed to the deployer.
    pub fn attempted_stacks(&self) -> usize {
        self.successful_stacks + self.failed_stacks
    }
}
