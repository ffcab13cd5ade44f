//! Domain errors for the QAAP orchestration core.

use thiserror::Error;

use super::models::status::NodeStatus;
use super::models::target::{Param, Service, Target};

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Target]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors: graph configuration and resolver misuse.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Params cannot have dependencies: {0}")]
    ParamHasDependency(Param),

    #[error("No dependency is defined for {} {}", .0.kind(), .0)]
    MissingDependency(Target),

    #[error("Connector {connector} in the dependency of {target} has no children")]
    EmptyConnector { target: Target, connector: String },

    #[error("Name {name} is used for both a {first} and a {second}")]
    AmbiguousName {
        name: String,
        first: String,
        second: String,
    },

    #[error("Dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Target>),

    #[error("Unknown {kind}: {name}")]
    UnknownTarget { kind: String, name: String },

    #[error("Invalid state transition for {target} from {from} to {to}")]
    InvalidStateTransition {
        target: String,
        from: NodeStatus,
        to: NodeStatus,
    },

    #[error("No service shim defined for service {0}")]
    MissingShim(Service),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Failure raised at the shim/task boundary.
///
/// Both variants end a task as `FAILED`; they differ in how loudly they are
/// logged. User errors are reported as a short message, internal errors with
/// full diagnostic detail.
#[derive(Debug, Error)]
pub enum ShimError {
    #[error("{0}")]
    User(String),

    #[error("{0}")]
    Internal(String),
}

impl ShimError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl From<std::io::Error> for ShimError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for ShimError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}

/// Errors raised by a scheduler when a job cannot be accepted.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid job specification for {job}: {reason}")]
    InvalidSpec { job: String, reason: String },

    #[error("Failed to prepare work directory {path}: {source}")]
    WorkDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Duplicate job id: {0}")]
    DuplicateJob(String),

    #[error("Scheduler requires a running tokio runtime")]
    NoRuntime,
}

impl From<SchedulerError> for ShimError {
    fn from(err: SchedulerError) -> Self {
        Self::Internal(err.to_string())
    }
}
