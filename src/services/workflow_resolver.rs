//! Live status table for one workflow run.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DependencyGraph, NodeStatus, Outcome, Param, Service, Target, WorkflowStatus,
};

/// Error recorded for services the user excluded.
pub const EXCLUDED: &str = "excluded";

/// Owns the node statuses of one run and keeps them consistent with the graph.
///
/// Params are seeded once: `COMPLETED` when supplied, `FAILED` otherwise.
/// Excluded nodes are seeded `FAILED` and never run; excluded services carry
/// the error [`EXCLUDED`]. Checkpoints and user
/// targets are derived and stored only once they are terminal, so every
/// stored status moves strictly forward. `RUNNABLE` is a view over pending
/// services and is never stored.
#[derive(Debug, Clone)]
pub struct WorkflowResolver {
    graph: Arc<DependencyGraph>,
    statuses: HashMap<Target, NodeStatus>,
    targets: Vec<Target>,
    excluded: HashSet<Target>,
    errors: BTreeMap<Service, String>,
}

impl WorkflowResolver {
    /// Seed a run.
    ///
    /// Fails when a supplied param, requested target or exclusion is not in
    /// the graph, or when a param is requested as a target.
    pub fn new<P, T, X>(
        graph: Arc<DependencyGraph>,
        provided: P,
        targets: T,
        excluded: X,
    ) -> DomainResult<Self>
    where
        P: IntoIterator<Item = Param>,
        T: IntoIterator<Item = Target>,
        X: IntoIterator<Item = Target>,
    {
        let provided: HashSet<Param> = provided.into_iter().collect();
        for param in &provided {
            if !graph.contains(&param.clone().into()) {
                return Err(unknown(&param.clone().into()));
            }
        }

        let targets: Vec<Target> = targets.into_iter().collect();
        for target in &targets {
            if !graph.contains(target) {
                return Err(unknown(target));
            }
            if let Target::Param(p) = target {
                return Err(DomainError::ValidationFailed(format!(
                    "param {p} cannot be requested as a target"
                )));
            }
        }

        let excluded: HashSet<Target> = excluded.into_iter().collect();
        for target in &excluded {
            if !graph.contains(target) {
                return Err(unknown(target));
            }
        }

        let mut statuses = HashMap::new();
        for param in graph.params() {
            let status = if provided.contains(param) {
                NodeStatus::Completed
            } else {
                NodeStatus::Failed
            };
            statuses.insert(Target::from(param.clone()), status);
        }
        let mut errors = BTreeMap::new();
        for target in &excluded {
            statuses.insert(target.clone(), NodeStatus::Failed);
            if let Target::Service(service) = target {
                errors.insert(service.clone(), EXCLUDED.to_string());
            }
        }

        let mut resolver = Self {
            graph,
            statuses,
            targets,
            excluded,
            errors,
        };
        resolver.refresh_all();

        info!(
            targets = ?resolver.targets.iter().map(ToString::to_string).collect::<Vec<_>>(),
            excluded = resolver.excluded.len(),
            "workflow resolver initialized"
        );
        Ok(resolver)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn is_excluded(&self, target: &Target) -> bool {
        self.excluded.contains(target)
    }

    /// Services that may be started now.
    ///
    /// The list is only valid until the next mutation: a service can drop out
    /// once a sibling alternative has succeeded, so callers re-poll.
    pub fn list_runnable(&self) -> Vec<Service> {
        self.graph
            .triggered_services(&self.targets, &self.statuses)
            .into_iter()
            .filter(|s| self.is_ready(s))
            .collect()
    }

    fn is_ready(&self, service: &Service) -> bool {
        let target = Target::from(service.clone());
        if self.stored(&target) != NodeStatus::Pending || self.excluded.contains(&target) {
            return false;
        }
        self.graph
            .dependency(&target)
            .is_some_and(|dep| self.graph.evaluate(dep, &self.statuses) == Outcome::Completed)
    }

    fn is_runnable(&self, service: &Service) -> bool {
        self.list_runnable().contains(service)
    }

    pub fn mark_started(&mut self, service: &Service) -> DomainResult<()> {
        let target = self.service_target(service)?;
        if !self.is_runnable(service) {
            return Err(self.invalid(&target, NodeStatus::Started));
        }
        debug!(service = %service, "service started");
        self.statuses.insert(target, NodeStatus::Started);
        Ok(())
    }

    pub fn mark_completed(&mut self, service: &Service) -> DomainResult<()> {
        let target = self.service_target(service)?;
        if self.stored(&target) != NodeStatus::Started {
            return Err(self.invalid(&target, NodeStatus::Completed));
        }
        info!(service = %service, "service completed");
        self.statuses.insert(target.clone(), NodeStatus::Completed);
        self.propagate(&target);
        Ok(())
    }

    /// Fail a service that is pending or started, recording `error`.
    pub fn mark_failed(&mut self, service: &Service, error: impl Into<String>) -> DomainResult<()> {
        let target = self.service_target(service)?;
        if self.stored(&target).is_terminal() {
            return Err(self.invalid(&target, NodeStatus::Failed));
        }
        let error = error.into();
        info!(service = %service, error = %error, "service failed");
        self.statuses.insert(target.clone(), NodeStatus::Failed);
        self.errors.insert(service.clone(), error);
        self.propagate(&target);
        Ok(())
    }

    /// Status of a node, with pending services that could start reported as
    /// `RUNNABLE`.
    pub fn status(&self, target: &Target) -> NodeStatus {
        let stored = self.stored(target);
        match target {
            Target::Service(s) if stored == NodeStatus::Pending && self.is_runnable(s) => {
                NodeStatus::Runnable
            }
            _ => stored,
        }
    }

    pub fn workflow_status(&self) -> WorkflowStatus {
        let outcomes: Vec<Outcome> = self
            .targets
            .iter()
            .map(|t| self.graph.outcome(t, &self.statuses))
            .collect();
        if outcomes.contains(&Outcome::Failed) {
            WorkflowStatus::Failed
        } else if outcomes.iter().all(|o| *o == Outcome::Completed) {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Running
        }
    }

    pub fn started(&self) -> Vec<Service> {
        self.services_with(NodeStatus::Started)
    }

    pub fn completed(&self) -> Vec<Service> {
        self.services_with(NodeStatus::Completed)
    }

    /// Failed services, excluded ones included.
    pub fn failed(&self) -> Vec<Service> {
        self.services_with(NodeStatus::Failed)
    }

    /// Error recorded for each failed service, [`EXCLUDED`] for exclusions.
    pub const fn errors(&self) -> &BTreeMap<Service, String> {
        &self.errors
    }

    /// Status of every service, by name.
    pub fn service_statuses(&self) -> BTreeMap<String, NodeStatus> {
        self.graph
            .services()
            .map(|s| (s.to_string(), self.status(&s.clone().into())))
            .collect()
    }

    fn services_with(&self, status: NodeStatus) -> Vec<Service> {
        self.graph
            .services()
            .filter(|s| self.stored(&Target::from((*s).clone())) == status)
            .cloned()
            .collect()
    }

    fn stored(&self, target: &Target) -> NodeStatus {
        self.statuses.get(target).copied().unwrap_or_default()
    }

    fn service_target(&self, service: &Service) -> DomainResult<Target> {
        let target = Target::from(service.clone());
        if self.graph.contains(&target) {
            Ok(target)
        } else {
            Err(unknown(&target))
        }
    }

    fn invalid(&self, target: &Target, to: NodeStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            target: target.to_string(),
            from: self.stored(target),
            to,
        }
    }

    /// Re-derive every node that (transitively) references `changed`.
    fn propagate(&mut self, changed: &Target) {
        let mut queue: VecDeque<Target> = self.graph.dependents(changed).iter().cloned().collect();
        let mut seen: HashSet<Target> = queue.iter().cloned().collect();
        while let Some(node) = queue.pop_front() {
            self.refresh(&node);
            for next in self.graph.dependents(&node) {
                if seen.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
    }

    fn refresh_all(&mut self) {
        let derived: Vec<Target> = self
            .graph
            .nodes()
            .filter(|t| matches!(t, Target::Checkpoint(_) | Target::UserTarget(_)))
            .collect();
        for node in derived {
            self.refresh(&node);
        }
    }

    /// Store the outcome of a checkpoint or user target once it is terminal.
    fn refresh(&mut self, node: &Target) {
        if !matches!(node, Target::Checkpoint(_) | Target::UserTarget(_)) {
            return;
        }
        if self.stored(node).is_terminal() {
            return;
        }
        let outcome = self.graph.outcome(node, &self.statuses);
        if outcome.is_terminal() {
            debug!(target = %node, outcome = ?outcome, "derived status settled");
            self.statuses.insert(node.clone(), outcome.into());
        }
    }
}

fn unknown(target: &Target) -> DomainError {
    DomainError::UnknownTarget {
        kind: target.kind().to_string(),
        name: target.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{all, one, opt, seq, Checkpoint, Dependency, UserTarget};

    fn svc(name: &str) -> Service {
        Service::new(name)
    }

    fn target(name: &str) -> Target {
        UserTarget::new(name).into()
    }

    fn resolver(graph: DependencyGraph, provided: &[&str], excluded: &[Target]) -> WorkflowResolver {
        let targets: Vec<Target> = graph.user_targets().cloned().map(Target::from).collect();
        WorkflowResolver::new(
            Arc::new(graph),
            provided.iter().map(|p| Param::new(*p)),
            targets,
            excluded.iter().cloned(),
        )
        .unwrap()
    }

    fn run(r: &mut WorkflowResolver, name: &str, ok: bool) {
        r.mark_started(&svc(name)).unwrap();
        if ok {
            r.mark_completed(&svc(name)).unwrap();
        } else {
            r.mark_failed(&svc(name), format!("{name} broke")).unwrap();
        }
    }

    #[test]
    fn test_best_effort_target_completes_without_unmet_service() {
        let graph = DependencyGraph::builder()
            .target("DEFAULT", all([opt(svc("A")), opt(svc("B"))]))
            .service("A", Param::new("x"))
            .service("B", Param::new("y"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        assert_eq!(r.list_runnable(), vec![svc("A")]);
        assert_eq!(r.workflow_status(), WorkflowStatus::Running);
        run(&mut r, "A", true);

        assert_eq!(r.status(&target("DEFAULT")), NodeStatus::Completed);
        assert_eq!(r.workflow_status(), WorkflowStatus::Completed);
        assert_eq!(r.status(&svc("B").into()), NodeStatus::Pending);
    }

    #[test]
    fn test_seq_failure_blocks_successor() {
        let graph = DependencyGraph::builder()
            .target("T", seq([svc("A"), svc("B")]))
            .service("A", Param::new("x"))
            .service("B", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        assert_eq!(r.list_runnable(), vec![svc("A")]);
        run(&mut r, "A", false);

        assert!(r.list_runnable().is_empty());
        assert_eq!(r.status(&target("T")), NodeStatus::Failed);
        assert_eq!(r.workflow_status(), WorkflowStatus::Failed);
        assert_eq!(r.errors().get(&svc("A")).map(String::as_str), Some("A broke"));
    }

    #[test]
    fn test_seq_runs_in_order() {
        let graph = DependencyGraph::builder()
            .target("T", seq([svc("A"), svc("B")]))
            .service("A", Param::new("x"))
            .service("B", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        assert!(r.mark_started(&svc("B")).is_err());
        run(&mut r, "A", true);
        assert_eq!(r.list_runnable(), vec![svc("B")]);
        run(&mut r, "B", true);
        assert_eq!(r.workflow_status(), WorkflowStatus::Completed);
    }

    #[test]
    fn test_one_falls_back_only_after_failure() {
        let graph = DependencyGraph::builder()
            .target("T", one([svc("A"), svc("B")]))
            .service("A", Param::new("x"))
            .service("B", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        assert_eq!(r.list_runnable(), vec![svc("A")]);
        r.mark_started(&svc("A")).unwrap();
        assert!(r.list_runnable().is_empty());
        r.mark_failed(&svc("A"), "no").unwrap();

        assert_eq!(r.list_runnable(), vec![svc("B")]);
        run(&mut r, "B", true);
        assert_eq!(r.workflow_status(), WorkflowStatus::Completed);
    }

    #[test]
    fn test_one_skips_excluded_alternative() {
        let graph = DependencyGraph::builder()
            .target("T", one([svc("A"), svc("B")]))
            .service("A", Param::new("x"))
            .service("B", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[svc("A").into()]);

        assert!(r.is_excluded(&svc("A").into()));
        assert_eq!(r.errors().get(&svc("A")).map(String::as_str), Some(EXCLUDED));
        assert!(!r.errors().contains_key(&svc("B")));
        assert_eq!(r.list_runnable(), vec![svc("B")]);
        assert_eq!(r.workflow_status(), WorkflowStatus::Running);
    }

    #[test]
    fn test_all_fails_as_soon_as_one_child_fails() {
        let graph = DependencyGraph::builder()
            .target("T", all([svc("A"), svc("B")]))
            .service("A", Param::new("x"))
            .service("B", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        assert_eq!(r.list_runnable(), vec![svc("A"), svc("B")]);
        r.mark_started(&svc("A")).unwrap();
        r.mark_started(&svc("B")).unwrap();
        r.mark_failed(&svc("B"), "bad input").unwrap();

        assert_eq!(r.status(&target("T")), NodeStatus::Failed);
        assert_eq!(r.status(&svc("A").into()), NodeStatus::Started);
    }

    #[test]
    fn test_opt_completes_only_after_terminal_child() {
        let graph = DependencyGraph::builder()
            .target("T", opt(svc("A")))
            .service("A", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        r.mark_started(&svc("A")).unwrap();
        assert_eq!(r.status(&target("T")), NodeStatus::Pending);
        r.mark_failed(&svc("A"), "crash").unwrap();
        assert_eq!(r.status(&target("T")), NodeStatus::Completed);
    }

    #[test]
    fn test_terminal_status_never_changes() {
        let graph = DependencyGraph::builder()
            .target("T", svc("A"))
            .service("A", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);

        run(&mut r, "A", true);
        let err = r.mark_failed(&svc("A"), "late").unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStateTransition {
                from: NodeStatus::Completed,
                to: NodeStatus::Failed,
                ..
            }
        ));
        assert!(r.mark_completed(&svc("A")).is_err());
        assert_eq!(r.status(&svc("A").into()), NodeStatus::Completed);
    }

    #[test]
    fn test_runnable_view() {
        let graph = DependencyGraph::builder()
            .target("T", svc("A"))
            .service("A", Param::new("x"))
            .build()
            .unwrap();
        let r = resolver(graph, &["x"], &[]);
        assert_eq!(r.status(&svc("A").into()), NodeStatus::Runnable);
        assert_eq!(r.service_statuses().get("A"), Some(&NodeStatus::Runnable));
    }

    #[test]
    fn test_pending_service_can_fail_without_starting() {
        let graph = DependencyGraph::builder()
            .target("T", svc("A"))
            .service("A", Param::new("x"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["x"], &[]);
        r.mark_failed(&svc("A"), "shim missing input").unwrap();
        assert_eq!(r.workflow_status(), WorkflowStatus::Failed);
        assert_eq!(r.failed(), vec![svc("A")]);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let graph = Arc::new(
            DependencyGraph::builder()
                .target("T", svc("A"))
                .service("A", Param::new("x"))
                .build()
                .unwrap(),
        );
        let err = WorkflowResolver::new(
            graph.clone(),
            [Param::new("x")],
            [target("NOPE")],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::UnknownTarget { .. }));

        let err = WorkflowResolver::new(graph, [Param::new("zz")], [target("T")], Vec::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown param: zz");
    }

    #[test]
    fn test_checkpoint_shared_by_consumers() {
        let graph = DependencyGraph::builder()
            .checkpoint(
                "have_contigs",
                one([Dependency::from(Param::new("contigs")), svc("Assemble").into()]),
            )
            .service("Assemble", Param::new("reads"))
            .service("Metrics", Checkpoint::new("have_contigs"))
            .target("T", svc("Metrics"))
            .build()
            .unwrap();
        let mut r = resolver(graph, &["reads"], &[]);

        assert_eq!(r.list_runnable(), vec![svc("Assemble")]);
        run(&mut r, "Assemble", true);
        assert_eq!(
            r.status(&Checkpoint::new("have_contigs").into()),
            NodeStatus::Completed
        );
        assert_eq!(r.list_runnable(), vec![svc("Metrics")]);
    }
}
