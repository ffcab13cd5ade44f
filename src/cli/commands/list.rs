//! Listing of the targets and services a workflow offers.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::{DependencyGraph, Target};
use crate::infrastructure::config::ConfigLoader;

use super::load_workflow;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Workflow definition to list instead of the built-in one
    #[arg(long)]
    pub workflow: Option<PathBuf>,

    /// Configuration file
    #[arg(long, env = "QAAP_CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct NodeOutput {
    pub name: String,
    pub depends_on: String,
}

#[derive(Debug, Serialize)]
pub struct NodeListOutput {
    #[serde(skip)]
    pub kind: &'static str,
    pub nodes: Vec<NodeOutput>,
    pub total: usize,
}

impl NodeListOutput {
    fn from_targets(
        kind: &'static str,
        graph: &DependencyGraph,
        targets: impl Iterator<Item = Target>,
    ) -> Self {
        let nodes: Vec<NodeOutput> = targets
            .map(|target| NodeOutput {
                depends_on: graph
                    .dependency(&target)
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                name: target.name().to_string(),
            })
            .collect();
        Self {
            kind,
            total: nodes.len(),
            nodes,
        }
    }
}

impl CommandOutput for NodeListOutput {
    fn to_human(&self) -> String {
        if self.nodes.is_empty() {
            return format!("No {}s found.", self.kind);
        }
        let mut table = list_table(&[self.kind, "depends on"]);
        for node in &self.nodes {
            table.add_row(vec![node.name.as_str(), node.depends_on.as_str()]);
        }
        table.to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn graph_for(args: &ListArgs) -> Result<DependencyGraph> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    load_workflow(args.workflow.as_deref().or(config.workflow.as_deref()))
        .map(|workflow| workflow.graph)
}

pub fn targets(args: &ListArgs, json_mode: bool) -> Result<()> {
    let graph = graph_for(args)?;
    let listing = NodeListOutput::from_targets(
        "target",
        &graph,
        graph.user_targets().cloned().map(Target::from),
    );
    output(&listing, json_mode);
    Ok(())
}

pub fn services(args: &ListArgs, json_mode: bool) -> Result<()> {
    let graph = graph_for(args)?;
    let listing = NodeListOutput::from_targets(
        "service",
        &graph,
        graph.services().cloned().map(Target::from),
    );
    output(&listing, json_mode);
    Ok(())
}
