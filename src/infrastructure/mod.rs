//! Infrastructure layer module
//!
//! This module contains the concrete implementations behind the domain ports
//! and the process-level plumbing:
//! - Configuration management
//! - Logging infrastructure
//! - Local job scheduling
//! - Workflow definitions
//! - Output files

pub mod config;
pub mod logging;
pub mod report;
pub mod scheduler;
pub mod workflow;
