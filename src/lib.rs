//! QAAP - Quality Analysis and Assurance Pipeline
//!
//! QAAP runs a set of sequence-analysis services over a sample's reads and
//! assembly. Which services run, and in what order, follows from a
//! dependency graph over the inputs the user supplied and the targets they
//! requested.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): dependency graph, statuses, Blackboard and ports
//! - **Service Layer** (`services`): workflow resolver, task machinery, control loop
//! - **Infrastructure Layer** (`infrastructure`): config, logging, scheduler, workflows, reports
//! - **Adapters** (`adapters`): shims binding services to external tools
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qaap::domain::models::{Param, Target, UserTarget};
//! use qaap::infrastructure::workflow::qaap_graph;
//! use qaap::services::WorkflowResolver;
//!
//! let graph = Arc::new(qaap_graph()?);
//! let resolver = WorkflowResolver::new(
//!     graph,
//!     [Param::new("reads")],
//!     [Target::from(UserTarget::new("DEFAULT"))],
//!     [],
//! )?;
//! assert_eq!(resolver.list_runnable().len(), 2);
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Blackboard, Config, Dependency, DependencyGraph, NodeStatus, Outcome, Target,
    WorkflowStatus,
};
pub use domain::ports::{Scheduler, ServiceShim, Task};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Executor, RunOutcome, ShimRegistry, WorkflowResolver};
