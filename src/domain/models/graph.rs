//! The static dependency graph and its pure evaluation rules.
//!
//! The graph maps every non-param node to its dependency expression. It holds
//! no run state; evaluation happens against a [`StatusSnapshot`] supplied by
//! the caller, so the same graph can back any number of independent runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::domain::errors::{DomainError, DomainResult};

use super::dependency::Dependency;
use super::status::{NodeStatus, Outcome};
use super::target::{Checkpoint, Param, Service, Target, UserTarget};

/// Read access to the status of nodes in a run.
pub trait StatusSnapshot {
    fn status_of(&self, target: &Target) -> NodeStatus;
}

impl StatusSnapshot for HashMap<Target, NodeStatus> {
    fn status_of(&self, target: &Target) -> NodeStatus {
        self.get(target).copied().unwrap_or_default()
    }
}

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: &Target,
    graph: &BTreeMap<Target, Vec<Target>>,
    visited: &mut HashSet<Target>,
    rec_stack: &mut HashSet<Target>,
    path: &mut Vec<Target>,
) -> bool {
    visited.insert(node.clone());
    rec_stack.insert(node.clone());
    path.push(node.clone());

    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                if let Some(cycle_start) = path.iter().position(|t| t == neighbor) {
                    path.drain(0..cycle_start);
                    path.push(neighbor.clone());
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

fn check_connectors(target: &Target, dep: &Dependency) -> DomainResult<()> {
    if let Some(connector) = dep.connector_name() {
        if dep.children().is_empty() {
            return Err(DomainError::EmptyConnector {
                target: target.clone(),
                connector: connector.to_string(),
            });
        }
    }
    for child in dep.children() {
        check_connectors(target, child)?;
    }
    Ok(())
}

/// Validated, immutable dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    params: BTreeSet<Param>,
    definitions: BTreeMap<Target, Dependency>,
    /// Reverse edges: node -> nodes whose expression references it.
    dependents: HashMap<Target, Vec<Target>>,
    names: HashMap<String, Target>,
}

impl DependencyGraph {
    /// Build and validate a graph.
    ///
    /// Params referenced by an expression are declared implicitly. Fails if a
    /// param has an expression, a referenced checkpoint/service/target has
    /// none, a connector is empty, a name is shared between kinds, or the
    /// graph contains a cycle.
    pub fn new<P, D>(params: P, definitions: D) -> DomainResult<Self>
    where
        P: IntoIterator<Item = Param>,
        D: IntoIterator<Item = (Target, Dependency)>,
    {
        let mut params: BTreeSet<Param> = params.into_iter().collect();
        let mut defs: BTreeMap<Target, Dependency> = BTreeMap::new();

        for (target, dep) in definitions {
            if let Target::Param(p) = target {
                return Err(DomainError::ParamHasDependency(p));
            }
            check_connectors(&target, &dep)?;
            if defs.insert(target.clone(), dep).is_some() {
                return Err(DomainError::ValidationFailed(format!(
                    "{} {} is defined more than once",
                    target.kind(),
                    target
                )));
            }
        }

        let mut dependents: HashMap<Target, Vec<Target>> = HashMap::new();
        let mut edges: BTreeMap<Target, Vec<Target>> = BTreeMap::new();
        for (target, dep) in &defs {
            for referenced in dep.referenced_targets() {
                match &referenced {
                    Target::Param(p) => {
                        params.insert(p.clone());
                    }
                    other if !defs.contains_key(other) => {
                        return Err(DomainError::MissingDependency(other.clone()));
                    }
                    other => edges.entry(target.clone()).or_default().push(other.clone()),
                }
                dependents
                    .entry(referenced.clone())
                    .or_default()
                    .push(target.clone());
            }
        }

        let mut names: HashMap<String, Target> = HashMap::new();
        let all_nodes = params
            .iter()
            .cloned()
            .map(Target::from)
            .chain(defs.keys().cloned());
        for node in all_nodes {
            if let Some(existing) = names.get(node.name()) {
                return Err(DomainError::AmbiguousName {
                    name: node.name().to_string(),
                    first: existing.kind().to_string(),
                    second: node.kind().to_string(),
                });
            }
            names.insert(node.name().to_string(), node);
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        for node in edges.keys() {
            if !visited.contains(node)
                && detect_cycle_util(node, &edges, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(DomainError::DependencyCycle(path));
            }
        }

        Ok(Self {
            params,
            definitions: defs,
            dependents,
            names,
        })
    }

    /// Start an incremental graph definition.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.definitions.keys().filter_map(Target::as_service)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.definitions.keys().filter_map(|t| match t {
            Target::Checkpoint(c) => Some(c),
            _ => None,
        })
    }

    pub fn user_targets(&self) -> impl Iterator<Item = &UserTarget> {
        self.definitions.keys().filter_map(|t| match t {
            Target::UserTarget(u) => Some(u),
            _ => None,
        })
    }

    /// Every node, params first.
    pub fn nodes(&self) -> impl Iterator<Item = Target> + '_ {
        self.params
            .iter()
            .cloned()
            .map(Target::from)
            .chain(self.definitions.keys().cloned())
    }

    pub fn dependency(&self, target: &Target) -> Option<&Dependency> {
        self.definitions.get(target)
    }

    pub fn contains(&self, target: &Target) -> bool {
        match target {
            Target::Param(p) => self.params.contains(p),
            other => self.definitions.contains_key(other),
        }
    }

    /// Look a node up by name. Names are unique across kinds.
    pub fn find(&self, name: &str) -> Option<&Target> {
        self.names.get(name)
    }

    /// Nodes whose expression references `target` directly.
    pub fn dependents(&self, target: &Target) -> &[Target] {
        self.dependents.get(target).map_or(&[], Vec::as_slice)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Effective outcome of a single node.
    ///
    /// A pending service whose own dependency has failed can never start and
    /// therefore counts as failed to its consumers, although its stored status
    /// stays `PENDING`. Params that were not supplied count as failed.
    pub fn outcome(&self, target: &Target, snapshot: &impl StatusSnapshot) -> Outcome {
        let status = snapshot.status_of(target);
        match status {
            NodeStatus::Completed => return Outcome::Completed,
            NodeStatus::Failed => return Outcome::Failed,
            _ => {}
        }
        match target {
            Target::Param(_) => Outcome::Failed,
            Target::Service(_) => {
                if status == NodeStatus::Started {
                    return Outcome::Pending;
                }
                match self.definitions.get(target) {
                    Some(dep) if self.evaluate(dep, snapshot) == Outcome::Failed => Outcome::Failed,
                    _ => Outcome::Pending,
                }
            }
            Target::Checkpoint(_) | Target::UserTarget(_) => self
                .definitions
                .get(target)
                .map_or(Outcome::Failed, |dep| self.evaluate(dep, snapshot)),
        }
    }

    /// Evaluate an expression against a snapshot. Connectors short-circuit.
    pub fn evaluate(&self, dep: &Dependency, snapshot: &impl StatusSnapshot) -> Outcome {
        if let Some(target) = dep.as_target() {
            return self.outcome(&target, snapshot);
        }
        match dep {
            Dependency::All(children) | Dependency::Seq(children) => {
                let mut pending = false;
                for child in children {
                    match self.evaluate(child, snapshot) {
                        Outcome::Failed => return Outcome::Failed,
                        Outcome::Pending => pending = true,
                        Outcome::Completed => {}
                    }
                }
                if pending {
                    Outcome::Pending
                } else {
                    Outcome::Completed
                }
            }
            Dependency::One(children) => {
                let mut pending = false;
                for child in children {
                    match self.evaluate(child, snapshot) {
                        Outcome::Completed => return Outcome::Completed,
                        Outcome::Pending => pending = true,
                        Outcome::Failed => {}
                    }
                }
                if pending {
                    Outcome::Pending
                } else {
                    Outcome::Failed
                }
            }
            Dependency::Opt(child) => {
                if self.evaluate(child, snapshot).is_terminal() {
                    Outcome::Completed
                } else {
                    Outcome::Pending
                }
            }
            Dependency::Oif(child) => self.evaluate(child, snapshot),
            _ => Outcome::Pending,
        }
    }

    /// Services that the given roots want to run next, in discovery order.
    ///
    /// Walks down from each root, descending only where a connector's own
    /// semantics need the child now: every non-terminal child of `ALL`, the
    /// first not yet succeeded child of `SEQ`, the first not yet failed child
    /// of `ONE`, the child of `OPT`, and nothing below `OIF`. A triggered
    /// service also triggers its own dependency expression.
    pub fn triggered_services(
        &self,
        roots: &[Target],
        snapshot: &impl StatusSnapshot,
    ) -> Vec<Service> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        for root in roots {
            self.trigger_target(root, snapshot, &mut out, &mut visited);
        }
        out
    }

    fn trigger_target(
        &self,
        target: &Target,
        snapshot: &impl StatusSnapshot,
        out: &mut Vec<Service>,
        visited: &mut HashSet<Target>,
    ) {
        if !visited.insert(target.clone()) {
            return;
        }
        if self.outcome(target, snapshot).is_terminal() {
            return;
        }
        if let Target::Service(service) = target {
            out.push(service.clone());
        }
        if let Some(dep) = self.definitions.get(target) {
            self.trigger_expression(dep, snapshot, out, visited);
        }
    }

    fn trigger_expression(
        &self,
        dep: &Dependency,
        snapshot: &impl StatusSnapshot,
        out: &mut Vec<Service>,
        visited: &mut HashSet<Target>,
    ) {
        if let Some(target) = dep.as_target() {
            self.trigger_target(&target, snapshot, out, visited);
            return;
        }
        if self.evaluate(dep, snapshot).is_terminal() {
            return;
        }
        match dep {
            Dependency::All(children) => {
                for child in children {
                    self.trigger_expression(child, snapshot, out, visited);
                }
            }
            Dependency::Seq(children) => {
                if let Some(next) = children
                    .iter()
                    .find(|c| self.evaluate(c, snapshot) != Outcome::Completed)
                {
                    self.trigger_expression(next, snapshot, out, visited);
                }
            }
            Dependency::One(children) => {
                if let Some(next) = children
                    .iter()
                    .find(|c| self.evaluate(c, snapshot) != Outcome::Failed)
                {
                    self.trigger_expression(next, snapshot, out, visited);
                }
            }
            Dependency::Opt(child) => self.trigger_expression(child, snapshot, out, visited),
            _ => {}
        }
    }
}

/// Incremental builder for [`DependencyGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    params: Vec<Param>,
    definitions: Vec<(Target, Dependency)>,
}

impl GraphBuilder {
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param::new(name));
        self
    }

    pub fn checkpoint(mut self, name: impl Into<String>, dep: impl Into<Dependency>) -> Self {
        self.definitions
            .push((Checkpoint::new(name).into(), dep.into()));
        self
    }

    pub fn service(mut self, name: impl Into<String>, dep: impl Into<Dependency>) -> Self {
        self.definitions.push((Service::new(name).into(), dep.into()));
        self
    }

    pub fn target(mut self, name: impl Into<String>, dep: impl Into<Dependency>) -> Self {
        self.definitions
            .push((UserTarget::new(name).into(), dep.into()));
        self
    }

    /// Define an arbitrary node; used by loaders that already hold targets.
    pub fn define(mut self, target: Target, dep: impl Into<Dependency>) -> Self {
        self.definitions.push((target, dep.into()));
        self
    }

    pub fn build(self) -> DomainResult<DependencyGraph> {
        DependencyGraph::new(self.params, self.definitions)
    }
}
