use std::{path::PathBuf, str::FromStr};

use clap::{Arg, ArgAction, ArgMatches, Command};
use stackflow_common::{deployment::RollbackStrategy, error::Error};
use stackflow_orchestrator::DeploymentOptions;
use strum_macros::{Display, EnumString};

pub const DEFAULT_CONFIG_PATH: &str = "./deployment.yaml";

#[derive(Clone, Debug, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Text,
    Json,
}

/// A fully parsed invocation.
#[derive(Debug, Clone)]
pub enum CliCommand {
    Deploy {
        config: PathBuf,
        options: DeploymentOptions,
        output: OutputFormat,
    },
    Validate {
        config: PathBuf,
    },
    Status {
        config: PathBuf,
        output: OutputFormat,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    #[error("Invalid value '{value}' for --{arg}: {message}")]
    InvalidValue {
        arg: &'static str,
        value: String,
        message: String,
    },

    #[error("Unknown subcommand '{0}'")]
    UnknownSubcommand(String),

    #[error("No subcommand given")]
    MissingSubcommand,
}

impl From<ArgError> for Error {
    fn from(err: ArgError) -> Self {
        Error::Config(err.to_string())
    }
}

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help("Path to the deployment configuration file (YAML or JSON)")
        .default_value(DEFAULT_CONFIG_PATH)
        .action(ArgAction::Set)
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .help("Report format: text or json")
        .default_value("text")
        .action(ArgAction::Set)
}

fn flag(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).help(help).action(ArgAction::SetTrue)
}

pub fn command() -> Command {
    Command::new("stackflow")
        .about("Deploys interdependent Pulumi stacks in dependency order")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("deploy")
                .about("Deploys every stack of a configuration")
                .arg(config_arg())
                .arg(flag("dry-run", "Preview every stack instead of deploying it"))
                .arg(flag(
                    "parallel",
                    "Deploy the independent stacks of each wave concurrently",
                ))
                .arg(flag(
                    "continue-on-failure",
                    "Keep deploying stacks that do not depend on a failed one",
                ))
                .arg(flag(
                    "rollback-on-failure",
                    "Roll back a stack once its retries are exhausted",
                ))
                .arg(flag("refresh", "Refresh recorded state before deploying"))
                .arg(
                    Arg::new("rollback-strategy")
                        .long("rollback-strategy")
                        .help("How a failed stack is rolled back: destroy or refresh")
                        .default_value("refresh")
                        .action(ArgAction::Set),
                )
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("validate")
                .about("Validates a configuration and prints its deployment plan")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("status")
                .about("Shows the outputs currently recorded for every stack")
                .arg(config_arg())
                .arg(output_arg()),
        )
}

fn parse_value<T: FromStr>(matches: &ArgMatches, arg: &'static str) -> Result<T, ArgError>
where
    T::Err: std::fmt::Display,
{
    let value = matches
        .get_one::<String>(arg)
        .cloned()
        .unwrap_or_default();

    value.parse::<T>().map_err(|e| ArgError::InvalidValue {
        arg,
        value,
        message: e.to_string(),
    })
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn parse(matches: &ArgMatches) -> Result<CliCommand, ArgError> {
    match matches.subcommand() {
        Some(("deploy", sub_matches)) => Ok(CliCommand::Deploy {
            config: config_path(sub_matches),
            options: DeploymentOptions {
                parallel: sub_matches.get_flag("parallel"),
                dry_run: sub_matches.get_flag("dry-run"),
                refresh: sub_matches.get_flag("refresh"),
                continue_on_failure: sub_matches.get_flag("continue-on-failure"),
                rollback_on_failure: sub_matches.get_flag("rollback-on-failure"),
                rollback_strategy: parse_value::<RollbackStrategy>(
                    sub_matches,
                    "rollback-strategy",
                )?,
            },
            output: parse_value(sub_matches, "output")?,
        }),
        Some(("validate", sub_matches)) => Ok(CliCommand::Validate {
            config: config_path(sub_matches),
        }),
        Some(("status", sub_matches)) => Ok(CliCommand::Status {
            config: config_path(sub_matches),
            output: parse_value(sub_matches, "output")?,
        }),
        Some((other, _)) => Err(ArgError::UnknownSubcommand(other.to_string())),
        None => Err(ArgError::MissingSubcommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Result<CliCommand, ArgError> {
        let matches = command()
            .try_get_matches_from(std::iter::once("stackflow").chain(args.iter().copied()))
            .unwrap();
        parse(&matches)
    }

    #[test]
    fn test_deploy_defaults() {
        let CliCommand::Deploy {
            config,
            options,
            output,
        } = parse_args(&["deploy"]).unwrap()
        else {
            panic!("expected deploy");
        };

        assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(output, OutputFormat::Text);
        assert!(!options.parallel);
        assert!(!options.dry_run);
        assert!(!options.continue_on_failure);
        assert!(!options.rollback_on_failure);
        assert_eq!(options.rollback_strategy, RollbackStrategy::Refresh);
    }

    #[test]
    fn test_deploy_flags() {
        let CliCommand::Deploy {
            config,
            options,
            output,
        } = parse_args(&[
            "deploy",
            "-c",
            "prod.json",
            "--parallel",
            "--dry-run",
            "--refresh",
            "--continue-on-failure",
            "--rollback-on-failure",
            "--rollback-strategy",
            "DESTROY",
            "--output",
            "json",
        ])
        .unwrap()
        else {
            panic!("expected deploy");
        };

        assert_eq!(config, PathBuf::from("prod.json"));
        assert_eq!(output, OutputFormat::Json);
        assert!(options.parallel);
        assert!(options.dry_run);
        assert!(options.refresh);
        assert!(options.continue_on_failure);
        assert!(options.rollback_on_failure);
        assert_eq!(options.rollback_strategy, RollbackStrategy::Destroy);
    }

    #[test]
    fn test_invalid_rollback_strategy() {
        let err = parse_args(&["deploy", "--rollback-strategy", "revert"]).unwrap_err();
        assert!(matches!(
            err,
            ArgError::InvalidValue {
                arg: "rollback-strategy",
                ..
            }
        ));
        assert!(Error::from(err).to_string().contains("revert"));
    }

    #[test]
    fn test_validate_and_status() {
        assert!(matches!(
            parse_args(&["validate", "--config", "a.yaml"]).unwrap(),
            CliCommand::Validate { config } if config == PathBuf::from("a.yaml")
        ));
        assert!(matches!(
            parse_args(&["status", "-o", "json"]).unwrap(),
            CliCommand::Status {
                output: OutputFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(command().try_get_matches_from(["stackflow"]).is_err());
    }
}
