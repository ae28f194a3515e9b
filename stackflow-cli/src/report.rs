use std::fmt::Write;

use serde::Serialize;
use stackflow_common::{
    deployment::{DeploymentConfig, DeploymentSummary},
    error::Error,
    stack::{StackOutputs, StackStatus},
};
use stackflow_orchestrator::ExecutionPlan;

use crate::cli::OutputFormat;

/// Outputs recorded for one stack, as reported by `stackflow status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackStatusReport {
    pub name: String,
    pub stack_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<StackOutputs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn render_summary(summary: &DeploymentSummary, format: OutputFormat) -> Result<String, Error> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
        OutputFormat::Text => Ok(summary_text(summary)),
    }
}

fn summary_text(summary: &DeploymentSummary) -> String {
    let mut out = String::new();
    let width = summary
        .results
        .iter()
        .map(|r| r.stack.len())
        .max()
        .unwrap_or(0);

    let _ = writeln!(
        out,
        "Deployment '{}' (run {}){}",
        summary.config_name,
        summary.run_id,
        if summary.dry_run { " [dry run]" } else { "" }
    );

    for result in &summary.results {
        let _ = write!(out, "  {:<width$}  {:<11}", result.stack, result.status.to_string());

        match result.status {
            StackStatus::Skipped => {
                let _ = write!(out, "  {}", result.skip_reason.as_deref().unwrap_or("-"));
            }
            _ => {
                let _ = write!(out, "  {:>8.1?}", result.duration);
                if result.retries > 0 {
                    let _ = write!(out, "  retries: {}", result.retries);
                }
            }
        }
        out.push('\n');

        if let Some(error) = &result.error {
            let _ = writeln!(out, "  {:<width$}  error: {}", "", error);
        }

        if let Some(rollback) = &result.rollback {
            match &rollback.error {
                None => {
                    let _ = writeln!(out, "  {:<width$}  rolled back", "");
                }
                Some(error) => {
                    let _ = writeln!(out, "  {:<width$}  rollback failed: {}", "", error);
                }
            }
        }
    }

    let _ = writeln!(
        out,
        "{} stacks: {} succeeded, {} failed, {} skipped in {:.1?}",
        summary.total_stacks,
        summary.successful_stacks,
        summary.failed_stacks,
        summary.skipped_stacks,
        summary.total_duration
    );

    out
}

/// Human-readable execution plan, one line per wave.
pub fn render_plan(config: &DeploymentConfig, plan: &ExecutionPlan) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Deployment '{}' is valid: {} stacks in {} waves",
        config.name,
        plan.len(),
        plan.waves().len()
    );
    let _ = writeln!(out, "Order: {}", plan.order().join(" -> "));

    for (idx, wave) in plan.waves().iter().enumerate() {
        let _ = writeln!(out, "  wave {}: {}", idx + 1, wave.join(", "));
    }

    out
}

pub fn render_status(reports: &[StackStatusReport], format: OutputFormat) -> Result<String, Error> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(reports)?);
    }

    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "{} ({})", report.name, report.stack_name);

        match (&report.outputs, &report.error) {
            (_, Some(error)) => {
                let _ = writeln!(out, "  unavailable: {}", error);
            }
            (Some(outputs), None) if !outputs.is_empty() => {
                for (key, value) in outputs {
                    let _ = writeln!(out, "  {} = {}", key, value);
                }
            }
            _ => {
                let _ = writeln!(out, "  no outputs");
            }
        }
    }

    Ok(out)
}
