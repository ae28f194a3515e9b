use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Progress notification emitted while a deployment run executes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub run_id: Uuid,
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub attempt: Option<u32>,
    pub message: Option<String>,
}

impl DeploymentEvent {
    pub fn run(run_id: Uuid, event_type: EventType, message: Option<String>) -> Self {
        Self {
            run_id,
            stack: None,
            timestamp: Utc::now(),
            event_type,
            attempt: None,
            message,
        }
    }

    pub fn stack(
        run_id: Uuid,
        stack: &str,
        event_type: EventType,
        attempt: Option<u32>,
        message: Option<String>,
    ) -> Self {
        Self {
            run_id,
            stack: Some(stack.to_string()),
            timestamp: Utc::now(),
            event_type,
            attempt,
            message,
        }
    }
}

/// How loudly an event is reported; ordered from least to most severe.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventSeverity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum EventType {
    // Run lifecycle
    RunPlanned,
    RunStart,
    RunSuccess,
    RunFailure,
    RunHalted,
    WaveStart,

    // Stack lifecycle
    StackStart,
    StackAttachEnvironments,
    StackRetrying,
    StackSuccess,
    StackFailure,
    StackSkipped,
    StackRollbackStart,
    StackRolledBack,
    StackRollbackFailure,
}

impl EventType {
    pub fn severity(&self) -> EventSeverity {
        match self {
            EventType::RunFailure | EventType::StackFailure | EventType::StackRollbackFailure => {
                EventSeverity::Error
            }
            EventType::RunHalted
            | EventType::StackRetrying
            | EventType::StackSkipped
            | EventType::StackRollbackStart
            | EventType::StackRolledBack => EventSeverity::Warn,
            EventType::StackAttachEnvironments | EventType::WaveStart => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_from_str() {
        let s = "STACK_ROLLED_BACK";
        let e = EventType::from_str(s).unwrap();
        assert_eq!(e, EventType::StackRolledBack);
    }

    #[test]
    fn test_to_string() {
        assert_eq!(EventType::RunStart.to_string(), "RUN_START");
    }

    #[test]
    fn test_failures_are_errors() {
        assert_eq!(EventType::StackFailure.severity(), EventSeverity::Error);
        assert_eq!(EventType::StackRetrying.severity(), EventSeverity::Warn);
        assert_eq!(EventType::StackSuccess.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_severity_order() {
        assert!(EventSeverity::Debug < EventSeverity::Info);
        assert!(EventType::StackRollbackFailure.severity() > EventType::StackRolledBack.severity());
        assert_eq!(EventSeverity::Warn.to_string(), "WARN");
    }
}
