//! Port trait definitions (Hexagonal Architecture)
//!
//! - Scheduler: admission and execution of external jobs
//! - ServiceShim / Task: per-service adapters and their executions
//!
//! These traits keep the orchestration core independent of how jobs are
//! actually run and which tools implement a service.

pub mod scheduler;
pub mod shim;

pub use scheduler::{Job, JobControl, Scheduler};
pub use shim::{ServiceShim, Task};
