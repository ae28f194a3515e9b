use std::{fmt::Debug, path::PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Configuration Not Found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Parse Error: {0}")]
    Parse(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Duplicate Stack: '{0}' is declared more than once")]
    DuplicateStack(String),

    #[error("Dependency Cycle Detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Unknown Dependency: stack '{stack}' depends on '{dependency}', which is not declared")]
    UnknownDependency { stack: String, dependency: String },

    #[error("Stack Deployment Error [{stack}]: {message}")]
    StackDeployment { stack: String, message: String },

    #[error("Rollback Error [{stack}]: {message}")]
    Rollback { stack: String, message: String },

    #[error("Timeout Error: {0}")]
    Timeout(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether an operation that failed with this error may be attempted again.
    /// ---
    /// Configuration, validation and graph errors are deterministic,
    /// repeating the call cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StackDeployment { .. } | Error::Timeout(_) | Error::Io(_)
        )
    }

    /// Errors that abort a run before any stack is touched.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::NotFound(_)
                | Error::Parse(_)
                | Error::Validation(_)
                | Error::DuplicateStack(_)
                | Error::DependencyCycle { .. }
                | Error::UnknownDependency { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let transient = Error::StackDeployment {
            stack: "net".to_string(),
            message: "throttled".to_string(),
        };
        assert!(transient.is_retryable());
        assert!(!transient.is_configuration_error());

        let validation = Error::Validation("missing stack".to_string());
        assert!(!validation.is_retryable());
        assert!(validation.is_configuration_error());
    }

    #[test]
    fn test_cycle_message_lists_members() {
        let err = Error::DependencyCycle {
            cycle: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency Cycle Detected: a -> b");
    }
}
