pub mod blackboard;
pub mod config;
pub mod dependency;
pub mod graph;
pub mod job;
pub mod run_data;
pub mod status;
pub mod target;
pub mod task;

pub use blackboard::Blackboard;
pub use config::{Config, LoggingConfig, OutputConfig, SchedulerConfig};
pub use dependency::{all, oif, one, opt, seq, Dependency};
pub use graph::{DependencyGraph, GraphBuilder, StatusSnapshot};
pub use job::{JobSpec, JobState, JobStatus, ResourceCaps};
pub use run_data::{SeqPairing, SeqPlatform};
pub use status::{NodeStatus, Outcome, WorkflowStatus};
pub use target::{Checkpoint, Param, Service, Target, TargetKind, UserTarget};
pub use task::{TaskKey, TaskState};
