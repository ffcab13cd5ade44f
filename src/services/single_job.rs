//! Executions that wrap exactly one external job.

use std::path::Path;

use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, JobSpec, JobState, Service, TaskState};
use crate::domain::ports::{Job, Scheduler, Task};

use super::execution::ServiceExecution;

/// Turns the output of a completed job into Blackboard results.
pub trait OutputCollector: Send {
    fn collect_output(
        &self,
        job: &Job,
        execution: &ServiceExecution,
        blackboard: &mut Blackboard,
    ) -> Result<(), ShimError>;
}

pub struct SingleJobExecution<C> {
    base: ServiceExecution,
    job: Option<Job>,
    collector: C,
}

impl<C: OutputCollector> SingleJobExecution<C> {
    pub const fn new(base: ServiceExecution, collector: C) -> Self {
        Self {
            base,
            job: None,
            collector,
        }
    }

    pub const fn base(&self) -> &ServiceExecution {
        &self.base
    }

    /// Record and submit the job. A no-op once the execution has failed.
    pub fn start(
        &mut self,
        blackboard: &mut Blackboard,
        scheduler: &mut dyn Scheduler,
        name: &str,
        spec: JobSpec,
        work_dir: &Path,
    ) -> Result<(), ShimError> {
        if !self.base.is_started() {
            return Ok(());
        }
        self.base.store_job_spec(blackboard, &spec);
        self.job = Some(scheduler.schedule_job(name, spec, work_dir)?);
        Ok(())
    }

    /// Fail the execution; used by shims for input validation errors.
    pub fn fail(&mut self, blackboard: &mut Blackboard, err: ShimError) -> TaskState {
        self.base.fail(blackboard, err)
    }
}

impl<C: OutputCollector> Task for SingleJobExecution<C> {
    fn service(&self) -> &Service {
        self.base.service()
    }

    fn execution_id(&self) -> Option<&str> {
        self.base.execution_id()
    }

    fn state(&self) -> TaskState {
        self.base.state()
    }

    fn error(&self) -> Option<&str> {
        self.base.error()
    }

    fn report(&mut self, blackboard: &mut Blackboard) -> TaskState {
        if !self.base.is_started() {
            return self.base.state();
        }
        let Some(job) = &self.job else {
            return self
                .base
                .fail(blackboard, ShimError::internal("no job was scheduled"));
        };
        match job.state() {
            JobState::Completed => {
                match self.collector.collect_output(job, &self.base, blackboard) {
                    Ok(()) => self.base.done(blackboard),
                    Err(err) => self.base.fail(blackboard, err),
                }
            }
            JobState::Failed => {
                let message = job
                    .error()
                    .unwrap_or_else(|| format!("job {} failed", job.name()));
                self.base.fail(blackboard, ShimError::User(message))
            }
            JobState::Pending | JobState::Running => self.base.state(),
        }
    }
}
