mod cli;
mod pulumi;
mod report;

use std::{path::Path, process::ExitCode, sync::Arc};

use cli::{CliCommand, OutputFormat};
use pulumi::PulumiCliDeployer;
use report::StackStatusReport;
use stackflow_common::{
    config::ConfigManager,
    deployer::StackDeployer,
    deployment::{DeploymentConfig, RecoveryOptions},
    error::Error,
    event::{DeploymentEvent, EventSeverity},
};
use stackflow_orchestrator::{
    DependencyResolver, DeploymentOptions, DeploymentOrchestrator, ExecutionPlan,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_LEVEL_ENV: &str = "PULUMI_LOG_LEVEL";
const EVENT_BUFFER: usize = 256;

/// Exit code used when the process is interrupted twice.
const INTERRUPTED: u8 = 130;

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is not an error; variables may come from the environment.
    let dotenv = dotenvy::dotenv();
    init_tracing();

    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let matches = cli::command().get_matches();

    let command = match cli::parse(&matches) {
        Ok(command) => command,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let config_manager = ConfigManager::from_env();

    let outcome = match command {
        CliCommand::Validate { config } => validate(&config_manager, &config),
        CliCommand::Status { config, output } => status(&config_manager, &config, output).await,
        CliCommand::Deploy {
            config,
            options,
            output,
        } => deploy(&config_manager, &config, options, output).await,
    };

    match outcome {
        Ok(code) => code,
        Err(err) if err.is_configuration_error() => {
            error!("Deployment configuration rejected: {}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_and_plan(
    config_manager: &ConfigManager,
    path: &Path,
) -> Result<(DeploymentConfig, ExecutionPlan), Error> {
    let config = config_manager.load_config(path)?;
    let plan = DependencyResolver::resolve(&config.stacks)?;
    Ok((config, plan))
}

fn validate(config_manager: &ConfigManager, path: &Path) -> Result<ExitCode, Error> {
    let (config, plan) = load_and_plan(config_manager, path)?;
    print!("{}", report::render_plan(&config, &plan));
    Ok(ExitCode::SUCCESS)
}

async fn status(
    config_manager: &ConfigManager,
    path: &Path,
    output: OutputFormat,
) -> Result<ExitCode, Error> {
    let (config, plan) = load_and_plan(config_manager, path)?;
    let deployer = PulumiCliDeployer::new();

    let mut reports = Vec::with_capacity(plan.len());
    for name in plan.order() {
        let stack = config
            .get_stack(name)
            .ok_or_else(|| Error::Internal(format!("Stack '{}' missing from configuration", name)))?;

        let (outputs, error) = match deployer.stack_outputs(stack).await {
            Ok(outputs) => (Some(outputs), None),
            Err(err) => {
                warn!("Could not read outputs of stack '{}': {}", name, err);
                (None, Some(err.to_string()))
            }
        };

        reports.push(StackStatusReport {
            name: stack.name.clone(),
            stack_name: stack.stack_name.clone(),
            outputs,
            error,
        });
    }

    print!("{}", report::render_status(&reports, output)?);
    Ok(ExitCode::SUCCESS)
}

/// Logs every progress event at the level matching its severity.
fn spawn_event_logger(mut event_rx: mpsc::Receiver<DeploymentEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let subject = event.stack.as_deref().unwrap_or("run");
            let message = event.message.as_deref().unwrap_or("");

            match event.event_type.severity() {
                EventSeverity::Debug => debug!("[{}] {} {}", subject, event.event_type, message),
                EventSeverity::Info => info!("[{}] {} {}", subject, event.event_type, message),
                EventSeverity::Warn => warn!("[{}] {} {}", subject, event.event_type, message),
                EventSeverity::Error => error!("[{}] {} {}", subject, event.event_type, message),
            }
        }
    })
}

async fn deploy(
    config_manager: &ConfigManager,
    path: &Path,
    options: DeploymentOptions,
    output: OutputFormat,
) -> Result<ExitCode, Error> {
    let config = config_manager.load_config(path)?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let event_logger = spawn_event_logger(event_rx);

    let deployer: Arc<dyn StackDeployer> = Arc::new(PulumiCliDeployer::new());
    let orchestrator =
        DeploymentOrchestrator::new(deployer, RecoveryOptions::default()).with_event_sender(event_tx);

    let summary = {
        let deployment = orchestrator.deploy_all(&config, &options);
        tokio::pin!(deployment);

        let mut interrupted = false;

        loop {
            tokio::select! {
                result = &mut deployment => break result?,

                _ = tokio::signal::ctrl_c() => {
                    if interrupted {
                        warn!("Received second Ctrl-C, aborting; running pulumi processes are killed");
                        return Ok(ExitCode::from(INTERRUPTED));
                    }

                    interrupted = true;
                    warn!("Received Ctrl-C, waiting for the deployment to finish (press again to abort)");
                }
            }
        }
    };

    // Closes the event channel so the logger drains and exits.
    drop(orchestrator);
    if let Err(err) = event_logger.await {
        debug!("Event logger ended abnormally: {}", err);
    }

    print!("{}", report::render_summary(&summary, output)?);

    if summary.failed_stacks > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use super::*;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validate_accepts_acyclic_config() {
        let file = config_file(
            r#"
name: prod
stacks:
  - name: app
    workDir: ./app
    stackName: acme/app/prod
    dependencies: [net]
  - name: net
    workDir: ./net
    stackName: acme/net/prod
"#,
        );

        let manager = ConfigManager::new(HashMap::new());
        let (_, plan) = load_and_plan(&manager, file.path()).unwrap();
        assert_eq!(plan.order(), ["net", "app"]);
        assert!(validate(&manager, file.path()).is_ok());
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let file = config_file(
            r#"
name: prod
stacks:
  - name: a
    workDir: ./a
    stackName: acme/a/prod
    dependencies: [b]
  - name: b
    workDir: ./b
    stackName: acme/b/prod
    dependencies: [a]
"#,
        );

        let manager = ConfigManager::new(HashMap::new());
        let err = validate(&manager, file.path()).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    #[test]
    fn test_missing_config_file() {
        let manager = ConfigManager::new(HashMap::new());
        let err = validate(&manager, Path::new("/nonexistent/deployment.yaml")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
