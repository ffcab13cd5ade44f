//! Workflow definitions: the built-in QAAP graph and YAML-defined graphs.

pub mod builtin;
pub mod loader;

pub use builtin::{qaap_graph, DEFAULT_TARGET};
pub use loader::{load_file, parse_graph, parse_workflow, Workflow, WorkflowDefinition};
