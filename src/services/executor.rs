//! The poll-based control loop driving one workflow run.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::run_data::timestamp;
use crate::domain::models::{Blackboard, NodeStatus, Service, TaskKey, TaskState, WorkflowStatus};
use crate::domain::ports::{Scheduler, Task};

use super::shim_registry::ShimRegistry;
use super::workflow_resolver::WorkflowResolver;

/// Result of one pass of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Tasks are in flight.
    Running,
    /// The workflow reached a final status.
    Done(WorkflowStatus),
    /// Nothing in flight, nothing runnable, and the workflow is not done.
    Stalled,
}

/// How a run ended.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: WorkflowStatus,
    pub stalled: bool,
    pub services: BTreeMap<String, NodeStatus>,
    pub errors: BTreeMap<String, String>,
}

/// Ties the resolver to shims and in-flight tasks.
///
/// The executor is the only owner of the resolver and the tasks; all
/// mutation happens on the calling task between polls.
pub struct Executor {
    resolver: WorkflowResolver,
    shims: ShimRegistry,
    scheduler: Box<dyn Scheduler>,
    poll_interval: Duration,
    tasks: Vec<Box<dyn Task>>,
}

impl Executor {
    /// Fails if a service in the resolver's graph has no shim.
    pub fn new(
        resolver: WorkflowResolver,
        shims: ShimRegistry,
        scheduler: Box<dyn Scheduler>,
        poll_interval: Duration,
    ) -> DomainResult<Self> {
        shims.validate(resolver.graph())?;
        Ok(Self {
            resolver,
            shims,
            scheduler,
            poll_interval,
            tasks: Vec::new(),
        })
    }

    pub const fn resolver(&self) -> &WorkflowResolver {
        &self.resolver
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Poll until the workflow is done or stalls.
    pub async fn run(&mut self, blackboard: &mut Blackboard) -> RunOutcome {
        info!(
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "executor started"
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (status, stalled) = loop {
            ticker.tick().await;
            match self.step(blackboard) {
                Step::Running => {}
                Step::Done(status) => break (status, false),
                Step::Stalled => {
                    warn!(
                        status = %self.resolver.workflow_status(),
                        "workflow stalled: nothing in flight and nothing runnable"
                    );
                    break (WorkflowStatus::Failed, true);
                }
            }
        };

        if !self.tasks.is_empty() {
            warn!(in_flight = self.tasks.len(), "abandoning tasks still in flight");
            self.abandon_in_flight(blackboard);
        }

        let services = self.resolver.service_statuses();
        for (name, node_status) in &services {
            blackboard.put_run_info(&format!("services/{name}"), node_status.as_str());
        }
        let errors = self
            .resolver
            .errors()
            .iter()
            .map(|(s, e)| (s.to_string(), e.clone()))
            .collect();

        info!(status = %status, stalled, "executor finished");
        RunOutcome {
            status,
            stalled,
            services,
            errors,
        }
    }

    /// One pass: fold finished tasks into the resolver, then start everything
    /// that has become runnable.
    pub fn step(&mut self, blackboard: &mut Blackboard) -> Step {
        self.collect(blackboard);

        let status = self.resolver.workflow_status();
        if status.is_done() {
            return Step::Done(status);
        }

        self.start_runnable(blackboard);

        let status = self.resolver.workflow_status();
        if status.is_done() {
            return Step::Done(status);
        }
        if self.tasks.is_empty() && self.resolver.list_runnable().is_empty() {
            return Step::Stalled;
        }
        Step::Running
    }

    fn collect(&mut self, blackboard: &mut Blackboard) {
        let mut still_running = Vec::with_capacity(self.tasks.len());
        for mut task in std::mem::take(&mut self.tasks) {
            match task.report(blackboard) {
                TaskState::Started => still_running.push(task),
                _ => self.fold(task.as_ref()),
            }
        }
        self.tasks = still_running;
    }

    fn start_runnable(&mut self, blackboard: &mut Blackboard) {
        // Re-poll after every start: a start that fails at once can change
        // what is runnable.
        while let Some(service) = self.resolver.list_runnable().into_iter().next() {
            if let Err(err) = self.resolver.mark_started(&service) {
                error!(service = %service, error = %err, "cannot start runnable service");
                return;
            }
            let Some(shim) = self.shims.get(&service) else {
                self.mark_failed(&service, "no shim bound to service");
                continue;
            };
            debug!(service = %service, shim = shim.name(), "executing service");
            let task = shim.execute(&service, None, blackboard, self.scheduler.as_mut());
            match task.state() {
                TaskState::Started => self.tasks.push(task),
                _ => self.fold(task.as_ref()),
            }
        }
    }

    fn fold(&mut self, task: &dyn Task) {
        let service = task.service().clone();
        match task.state() {
            TaskState::Completed => {
                if let Err(err) = self.resolver.mark_completed(&service) {
                    error!(service = %service, error = %err, "failed to record completion");
                }
            }
            TaskState::Failed => {
                let message = task.error().unwrap_or("failed").to_string();
                self.mark_failed(&service, message);
            }
            TaskState::Started => {}
        }
    }

    /// Close the records of tasks the finished workflow no longer waits for.
    /// Their status stays `STARTED`; the end time and a warning say why.
    fn abandon_in_flight(&mut self, blackboard: &mut Blackboard) {
        let now = timestamp(Utc::now());
        for task in std::mem::take(&mut self.tasks) {
            let key = TaskKey::new(task.service().clone(), task.execution_id().map(String::from));
            let base = format!("services/{}", key.path_segment());
            blackboard.put(&format!("{base}/task_info/time/end"), now.clone());
            blackboard.put(&format!("{base}/task_info/abandoned"), true);
            blackboard.append_to(
                &format!("{base}/warnings"),
                "abandoned: workflow finished before the service did",
            );
            debug!(service = %key, "task abandoned");
        }
    }

    fn mark_failed(&mut self, service: &Service, message: impl Into<String>) {
        if let Err(err) = self.resolver.mark_failed(service, message) {
            error!(service = %service, error = %err, "failed to record failure");
        }
    }
}
