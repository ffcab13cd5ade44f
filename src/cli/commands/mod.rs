//! CLI command implementations.

pub mod list;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::infrastructure::workflow::{load_file, qaap_graph, Workflow};

/// The workflow to run: `path` when given, otherwise the built-in graph.
pub(crate) fn load_workflow(path: Option<&Path>) -> Result<Workflow> {
    match path {
        Some(path) => {
            let workflow = load_file(path)?;
            info!(workflow = %path.display(), "loaded workflow definition");
            Ok(workflow)
        }
        None => qaap_graph()
            .map(Workflow::from)
            .context("Built-in workflow is invalid"),
    }
}
