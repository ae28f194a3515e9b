use std::path::Path;

use crate::{deployment::DeploymentConfig, error::Error};

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.json` files are JSON, everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

pub fn parse_document(contents: &str, format: ConfigFormat) -> Result<DeploymentConfig, Error> {
    match format {
        ConfigFormat::Yaml => parse_yaml(contents),
        ConfigFormat::Json => parse_json(contents),
    }
}

pub fn parse_yaml(yaml_str: &str) -> Result<DeploymentConfig, Error> {
    let config: DeploymentConfig = serde_yaml::from_str(yaml_str).map_err(|e| {
        let err = if let Some(location) = e.location() {
            ParseError::InvalidYaml {
                line: location.line(),
                column: location.column(),
                message: e.to_string(),
            }
        } else {
            ParseError::InvalidYamlNoLocation {
                message: e.to_string(),
            }
        };
        Error::Parse(err.to_string())
    })?;

    Ok(config)
}

pub fn parse_json(json_str: &str) -> Result<DeploymentConfig, Error> {
    let config: DeploymentConfig = serde_json::from_str(json_str).map_err(|e| {
        Error::Parse(
            ParseError::InvalidJson {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            }
            .to_string(),
        )
    })?;

    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid YAML config at line {line}, column {column}: {message}")]
    InvalidYaml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid YAML config: {message}")]
    InvalidYamlNoLocation { message: String },

    #[error("Invalid JSON config at line {line}, column {column}: {message}")]
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },
}
