//! Declarative workflow definitions.
//!
//! ```yaml
//! params: [reads, contigs, reference]
//! services:
//!   ReadsMetrics: { param: reads }
//!   Quast: { all: [ { param: contigs }, { opt: { param: reference } } ] }
//! targets:
//!   DEFAULT: { all: [ { opt: { service: ReadsMetrics } }, { opt: { service: Quast } } ] }
//! ```
//!
//! Services without a backend must be listed under `unimplemented:`; they
//! run as stand-ins that fail. Any other service needs a shim.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Checkpoint, Dependency, DependencyGraph, Param, Service, Target, UserTarget};

/// A workflow as written in YAML. Validation happens in [`into_graph`].
///
/// [`into_graph`]: WorkflowDefinition::into_graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowDefinition {
    pub params: Vec<Param>,
    pub checkpoints: BTreeMap<String, Dependency>,
    pub services: BTreeMap<String, Dependency>,
    pub targets: BTreeMap<String, Dependency>,
    /// Services deliberately left without a backend.
    pub unimplemented: Vec<Service>,
}

/// A validated workflow.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub graph: DependencyGraph,
    /// Services bound to a failing stand-in instead of a real shim.
    pub unimplemented: BTreeSet<Service>,
}

impl From<DependencyGraph> for Workflow {
    fn from(graph: DependencyGraph) -> Self {
        Self {
            graph,
            unimplemented: BTreeSet::new(),
        }
    }
}

impl WorkflowDefinition {
    pub fn from_yaml(text: &str) -> DomainResult<Self> {
        let de = serde_yaml::Deserializer::from_str(text);
        Ok(serde_yaml::with::singleton_map_recursive::deserialize(de)?)
    }

    pub fn into_workflow(mut self) -> DomainResult<Workflow> {
        let unimplemented: BTreeSet<Service> =
            std::mem::take(&mut self.unimplemented).into_iter().collect();
        let graph = self.into_graph()?;
        if let Some(unknown) = unimplemented
            .iter()
            .find(|s| !graph.contains(&Target::from((*s).clone())))
        {
            return Err(DomainError::ValidationFailed(format!(
                "unimplemented service {unknown} is not defined in the workflow"
            )));
        }
        Ok(Workflow {
            graph,
            unimplemented,
        })
    }

    pub fn into_graph(self) -> DomainResult<DependencyGraph> {
        let definitions = self
            .checkpoints
            .into_iter()
            .map(|(name, dep)| (Target::from(Checkpoint::new(name)), dep))
            .chain(
                self.services
                    .into_iter()
                    .map(|(name, dep)| (Target::from(Service::new(name)), dep)),
            )
            .chain(
                self.targets
                    .into_iter()
                    .map(|(name, dep)| (Target::from(UserTarget::new(name)), dep)),
            );
        DependencyGraph::new(self.params, definitions)
    }
}

/// Parse YAML text into a validated workflow.
pub fn parse_workflow(text: &str) -> DomainResult<Workflow> {
    let definition = WorkflowDefinition::from_yaml(text)?;
    if definition.targets.is_empty() {
        return Err(DomainError::ValidationFailed(
            "workflow defines no targets".to_string(),
        ));
    }
    definition.into_workflow()
}

/// Parse YAML text straight into a validated graph.
pub fn parse_graph(text: &str) -> DomainResult<DependencyGraph> {
    parse_workflow(text).map(|workflow| workflow.graph)
}

pub fn load_file(path: &Path) -> Result<Workflow> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
    parse_workflow(&text).with_context(|| format!("Invalid workflow file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{all, opt};
    use std::io::Write;

    const SAMPLE: &str = r"
params: [reads, contigs, reference]
services:
  ReadsMetrics: { param: reads }
  Quast: { all: [ { param: contigs }, { opt: { param: reference } } ] }
targets:
  DEFAULT: { all: [ { opt: { service: ReadsMetrics } }, { opt: { service: Quast } } ] }
";

    #[test]
    fn test_parse_connectors() {
        let def = WorkflowDefinition::from_yaml(SAMPLE).unwrap();
        assert_eq!(def.params.len(), 3);
        assert_eq!(
            def.services["Quast"],
            all([
                Dependency::from(Param::new("contigs")),
                opt(Param::new("reference")),
            ])
        );

        let graph = def.into_graph().unwrap();
        assert_eq!(graph.services().count(), 2);
        assert!(graph.find("DEFAULT").is_some());
    }

    #[test]
    fn test_undefined_service_rejected() {
        let err = parse_graph("targets:\n  T: { service: Missing }\n").unwrap_err();
        assert!(matches!(err, DomainError::MissingDependency(_)));
    }

    #[test]
    fn test_cycle_rejected() {
        let yaml = r"
services:
  A: { service: B }
  B: { all: [ { service: A }, { param: x } ] }
targets:
  T: { service: A }
";
        let err = parse_graph(yaml).unwrap_err();
        assert!(matches!(err, DomainError::DependencyCycle(_)));
    }

    #[test]
    fn test_empty_connector_rejected() {
        let err = parse_graph("services:\n  A: { one: [] }\ntargets:\n  T: { service: A }\n")
            .unwrap_err();
        assert!(err.to_string().contains("has no children"));
    }

    #[test]
    fn test_no_targets_rejected() {
        let err = parse_graph("params: [x]\n").unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn test_unimplemented_services_are_declared() {
        let yaml = r"
params: [reads]
services:
  SKESA: { param: reads }
targets:
  T: { service: SKESA }
unimplemented: [SKESA]
";
        let workflow = parse_workflow(yaml).unwrap();
        assert!(workflow.unimplemented.contains(&Service::new("SKESA")));

        let err = parse_workflow(&yaml.replace("[SKESA]", "[Spades]")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: unimplemented service Spades is not defined in the workflow"
        );
    }

    #[test]
    fn test_load_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "targets: [not, a, map]").unwrap();
        let err = load_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid workflow file"));

        let missing = load_file(Path::new("/nonexistent/workflow.yaml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read workflow file"));
    }
}
