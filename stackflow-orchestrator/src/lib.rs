pub mod orchestrator;
pub mod resolver;
pub mod retry;

pub use orchestrator::{DeploymentOptions, DeploymentOrchestrator};
pub use resolver::{DependencyResolver, ExecutionPlan};
pub use retry::{RetryOutcome, RetryPolicy};
