use std::{io::ErrorKind, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use stackflow_common::{
    deployer::{DeployRequest, StackDeployer},
    deployment::RollbackStrategy,
    error::Error,
    stack::{StackConfig, StackOutputs},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Environment variable carrying the outputs of a stack's dependencies as JSON.
pub const UPSTREAM_OUTPUTS_ENV: &str = "STACKFLOW_UPSTREAM_OUTPUTS";

const ASSUME_ROLE_CONFIG_KEY: &str = "aws:assumeRole.roleArn";

/// Lines of stderr kept in a failure message.
const ERROR_TAIL_LINES: usize = 20;

/// stderr fragments meaning the project or stack does not exist; retrying cannot help.
const MISSING_TARGET_MARKERS: [&str; 3] = [
    "no Pulumi.yaml project file found",
    "no stack named",
    "could not find stack",
];

/// Only counts as a missing target when the line names the stack's work dir.
const MISSING_PATH_MARKER: &str = "no such file or directory";

/// Drives stacks through the `pulumi` CLI.
/// ---
/// Every call spawns one child process. Children are killed when the
/// returned future is dropped, so a caller-side timeout stops the CLI too.
#[derive(Debug, Clone)]
pub struct PulumiCliDeployer {
    binary: PathBuf,

    /// Arguments placed before every pulumi subcommand, e.g. for wrappers like `npx pulumi`.
    leading_args: Vec<String>,
}

/// Captured result of a finished child process.
struct ProcessOutput {
    success: bool,
    code: Option<i32>,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl Default for PulumiCliDeployer {
    fn default() -> Self {
        Self::new()
    }
}

impl PulumiCliDeployer {
    pub fn new() -> Self {
        Self::with_binary("pulumi")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self::with_command(binary, Vec::<String>::new())
    }

    pub fn with_command<I, S>(binary: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            binary: binary.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a task that forwards a child pipe to tracing line by line
    /// and returns every line once the pipe closes.
    /// ---
    /// Bytes that are not valid UTF-8 are replaced, never dropped, so one
    /// bad byte cannot hide the lines after it.
    fn create_log_capture_task<R>(
        pipe: R,
        stack: String,
        stream: &'static str,
    ) -> JoinHandle<std::io::Result<Vec<String>>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = Vec::new();
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }

                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                debug!("Stack [{}] {}: {}", stack, stream, line);
                lines.push(line);
            }

            Ok(lines)
        })
    }

    async fn run(
        &self,
        stack: &StackConfig,
        args: Vec<String>,
        envs: Vec<(&'static str, String)>,
    ) -> Result<ProcessOutput, Error> {
        let command_line = args.join(" ");
        debug!(
            "Stack [{}]: running {} {}",
            stack.name,
            self.binary.display(),
            command_line
        );

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(&self.leading_args)
            .args(&args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::Config(format!(
                "Pulumi CLI not found at '{}'",
                self.binary.display()
            )),
            _ => Error::Io(err),
        })?;

        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Failed to get pulumi stdout".to_string()))?;

        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("Failed to get pulumi stderr".to_string()))?;

        let stdout_task = Self::create_log_capture_task(child_stdout, stack.name.clone(), "stdout");
        let stderr_task = Self::create_log_capture_task(child_stderr, stack.name.clone(), "stderr");

        let status = child.wait().await?;

        let stdout = stdout_task
            .await
            .map_err(|e| Error::Internal(format!("stdout capture task failed: {}", e)))??;
        let stderr = stderr_task
            .await
            .map_err(|e| Error::Internal(format!("stderr capture task failed: {}", e)))??;

        Ok(ProcessOutput {
            success: status.success(),
            code: status.code(),
            stdout,
            stderr,
        })
    }

    /// Runs a command and fails unless it exits successfully.
    async fn run_checked(
        &self,
        stack: &StackConfig,
        args: Vec<String>,
        envs: Vec<(&'static str, String)>,
    ) -> Result<Vec<String>, Error> {
        let subcommand = args.first().cloned().unwrap_or_default();
        let output = self.run(stack, args, envs).await?;

        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify_failure(stack, &subcommand, output.code, &output.stderr))
        }
    }
}

#[async_trait]
impl StackDeployer for PulumiCliDeployer {
    async fn deploy(&self, request: &DeployRequest) -> Result<StackOutputs, Error> {
        info!(
            "Stack [{}]: pulumi up on {} (attempt {})",
            request.stack.name, request.stack.stack_name, request.attempt
        );

        let envs = upstream_env(request)?;
        self.run_checked(&request.stack, change_args("up", request), envs)
            .await?;

        self.stack_outputs(&request.stack).await
    }

    async fn preview(&self, request: &DeployRequest) -> Result<StackOutputs, Error> {
        info!(
            "Stack [{}]: pulumi preview on {}",
            request.stack.name, request.stack.stack_name
        );

        let envs = upstream_env(request)?;
        self.run_checked(&request.stack, change_args("preview", request), envs)
            .await?;

        self.stack_outputs(&request.stack).await
    }

    async fn rollback(&self, stack: &StackConfig, strategy: RollbackStrategy) -> Result<(), Error> {
        let subcommand = match strategy {
            RollbackStrategy::Destroy => "destroy",
            RollbackStrategy::Refresh => "refresh",
        };
        warn!("Stack [{}]: pulumi {} on {}", stack.name, subcommand, stack.stack_name);

        let mut args = vec![subcommand.to_string(), "--yes".to_string()];
        args.extend(target_args(stack));

        self.run_checked(stack, args, Vec::new())
            .await
            .map(|_| ())
            .map_err(|err| Error::Rollback {
                stack: stack.name.clone(),
                message: err.to_string(),
            })
    }

    async fn add_secret_environments(
        &self,
        stack: &StackConfig,
        environments: &[String],
    ) -> Result<(), Error> {
        if environments.is_empty() {
            return Ok(());
        }

        let mut args = vec!["config".to_string(), "env".to_string(), "add".to_string()];
        args.extend(environments.iter().cloned());
        args.push("--yes".to_string());
        args.extend(target_args(stack));

        self.run_checked(stack, args, Vec::new()).await.map(|_| ())
    }

    async fn stack_outputs(&self, stack: &StackConfig) -> Result<StackOutputs, Error> {
        let mut args = vec![
            "stack".to_string(),
            "output".to_string(),
            "--json".to_string(),
        ];
        args.extend(target_args(stack));

        let stdout = self.run_checked(stack, args, Vec::new()).await?;
        parse_outputs(&stdout.join("\n"))
    }
}

fn target_args(stack: &StackConfig) -> Vec<String> {
    vec![
        "--stack".to_string(),
        stack.stack_name.clone(),
        "--cwd".to_string(),
        stack.work_dir.clone(),
        "--non-interactive".to_string(),
    ]
}

/// Arguments of `up` or `preview` for a deploy request.
/// ---
/// `--config` values are written to the stack's config file, so the role is
/// only set by `up`; a preview runs against whatever role is already stored.
fn change_args(subcommand: &str, request: &DeployRequest) -> Vec<String> {
    let mut args = vec![subcommand.to_string()];
    let applies = subcommand == "up";

    if applies {
        args.push("--yes".to_string());
    }

    if request.refresh {
        args.push("--refresh".to_string());
    }

    if let Some(role_arn) = request.stack.role_arn.as_ref().filter(|_| applies) {
        // Nested key: `aws:assumeRole` is an object holding `roleArn`.
        args.push("--config-path".to_string());
        args.push("--config".to_string());
        args.push(format!("{}={}", ASSUME_ROLE_CONFIG_KEY, role_arn));
    }

    args.extend(target_args(&request.stack));
    args
}

fn upstream_env(request: &DeployRequest) -> Result<Vec<(&'static str, String)>, Error> {
    if request.upstream_outputs.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![(
        UPSTREAM_OUTPUTS_ENV,
        serde_json::to_string(&request.upstream_outputs)?,
    )])
}

fn parse_outputs(stdout: &str) -> Result<StackOutputs, Error> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(StackOutputs::new());
    }

    Ok(serde_json::from_str(stdout)?)
}

/// Turns a non-zero exit into an error, non-retryable when the target is missing.
fn classify_failure(
    stack: &StackConfig,
    subcommand: &str,
    code: Option<i32>,
    stderr: &[String],
) -> Error {
    let tail = stderr[stderr.len().saturating_sub(ERROR_TAIL_LINES)..].join("\n");
    let exit = code
        .map(|code| format!("exit code {}", code))
        .unwrap_or_else(|| "a signal".to_string());

    let missing_target = stderr.iter().any(|line| {
        MISSING_TARGET_MARKERS
            .iter()
            .any(|marker| line.contains(marker))
            || (line.contains(MISSING_PATH_MARKER) && line.contains(stack.work_dir.as_str()))
    });

    if missing_target {
        return Error::Validation(format!(
            "stack '{}' ({} in {}) cannot be deployed: {}",
            stack.name, stack.stack_name, stack.work_dir, tail
        ));
    }

    Error::StackDeployment {
        stack: stack.name.clone(),
        message: format!("pulumi {} terminated with {}: {}", subcommand, exit, tail),
    }
}
