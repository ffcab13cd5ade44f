//! External job specifications and states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What to run and how much of the host it may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Executable to invoke (resolved on `PATH`).
    pub command: String,
    /// Argument vector, excluding the executable.
    pub args: Vec<String>,
    /// Requested CPU count.
    pub cpus: u32,
    /// Requested memory in GB.
    pub mem_gb: f64,
    /// Requested scratch disk in GB.
    pub disk_gb: f64,
    /// Wall-clock budget in seconds; zero means no per-job limit.
    pub time_secs: u64,
}

impl JobSpec {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            cpus: 1,
            mem_gb: 0.0,
            disk_gb: 0.0,
            time_secs: 0,
        }
    }

    /// A `sh -c` invocation; `name` becomes `$0` so it shows up in `ps`.
    pub fn shell(script: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("sh", [String::from("-c"), script.into(), name.into()])
    }

    #[must_use]
    pub const fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = cpus;
        self
    }

    #[must_use]
    pub const fn with_mem_gb(mut self, mem_gb: f64) -> Self {
        self.mem_gb = mem_gb;
        self
    }

    #[must_use]
    pub const fn with_disk_gb(mut self, disk_gb: f64) -> Self {
        self.disk_gb = disk_gb;
        self
    }

    #[must_use]
    pub const fn with_time_secs(mut self, time_secs: u64) -> Self {
        self.time_secs = time_secs;
        self
    }

    /// Command line for logs and task records.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Global resource ceilings enforced by a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCaps {
    pub cpus: u32,
    pub mem_gb: f64,
    /// `None` means unlimited.
    pub disk_gb: Option<f64>,
    /// Overall run budget in seconds; `None` means unlimited.
    pub time_secs: Option<u64>,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        Self {
            cpus: 1,
            mem_gb: 1.0,
            disk_gb: None,
            time_secs: None,
        }
    }
}

/// Lifecycle of one external job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status of a job: its state plus the error once failed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobStatus {
    pub state: JobState,
    pub error: Option<String>,
}

impl JobStatus {
    pub const fn running() -> Self {
        Self {
            state: JobState::Running,
            error: None,
        }
    }

    pub const fn completed() -> Self {
        Self {
            state: JobState::Completed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            error: Some(error.into()),
        }
    }
}
