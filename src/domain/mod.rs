//! Domain layer for the QAAP orchestration core
//!
//! This module contains the dependency graph, status models, the Blackboard
//! and the ports through which the core reaches schedulers and shims.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, SchedulerError, ShimError};
