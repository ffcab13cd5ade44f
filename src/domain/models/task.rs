//! Task (service execution) states.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::target::Service;

/// State of one service execution. `Started` is entered on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Started,
    Completed,
    Failed,
}

impl TaskState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a task: the service plus an optional fan-out execution id
/// distinguishing invocations of the same service under different parents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub service: Service,
    pub execution_id: Option<String>,
}

impl TaskKey {
    pub const fn new(service: Service, execution_id: Option<String>) -> Self {
        Self {
            service,
            execution_id,
        }
    }

    /// Blackboard path segment under `services/`.
    pub fn path_segment(&self) -> String {
        match &self.execution_id {
            Some(xid) => format!("{}:{xid}", self.service),
            None => self.service.to_string(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_segment())
    }
}
