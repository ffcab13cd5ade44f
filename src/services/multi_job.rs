//! Fan-out executions: one job per input unit, joined "best of N".
//!
//! Nothing is observable until every job is terminal. Then each completed
//! job's output is collected (a collector error only costs that job), every
//! job is cleaned up, and the execution completes if at least one job made
//! it through.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, JobSpec, JobState, Service, TaskState};
use crate::domain::ports::{Job, Scheduler, Task};

use super::execution::ServiceExecution;

/// Per-job output handling for a [`MultiJobExecution`].
pub trait JobCollector: Send {
    /// Data kept alongside each job, e.g. the input id it processes.
    type Tag: Send;

    /// Add the output of a completed job to `results`.
    fn collect_job(
        &self,
        results: &mut Map<String, Value>,
        job: &Job,
        tag: &Self::Tag,
    ) -> Result<(), ShimError>;

    /// Release whatever the job held, whatever its outcome.
    fn cleanup_job(&self, _job: &Job, _tag: &Self::Tag) -> Result<(), ShimError> {
        Ok(())
    }
}

pub struct MultiJobExecution<C: JobCollector> {
    base: ServiceExecution,
    jobs: Vec<(Job, C::Tag)>,
    job_errors: Vec<String>,
    collector: C,
}

impl<C: JobCollector> MultiJobExecution<C> {
    pub const fn new(base: ServiceExecution, collector: C) -> Self {
        Self {
            base,
            jobs: Vec::new(),
            job_errors: Vec::new(),
            collector,
        }
    }

    pub const fn base(&self) -> &ServiceExecution {
        &self.base
    }

    /// Submit one job and remember its tag. A no-op once failed.
    pub fn add_job(
        &mut self,
        blackboard: &mut Blackboard,
        scheduler: &mut dyn Scheduler,
        name: &str,
        spec: JobSpec,
        work_dir: &Path,
        tag: C::Tag,
    ) -> Result<(), ShimError> {
        if !self.base.is_started() {
            return Ok(());
        }
        if let Ok(value) = serde_json::to_value(&spec) {
            self.base
                .put_task_info(blackboard, &format!("jobs/{name}"), value);
        }
        let job = scheduler.schedule_job(name, spec, work_dir)?;
        debug!(service = %self.base.key(), job = name, "job scheduled");
        self.jobs.push((job, tag));
        Ok(())
    }

    pub fn fail(&mut self, blackboard: &mut Blackboard, err: ShimError) -> TaskState {
        self.base.fail(blackboard, err)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// `"<job>: <error>"` for every job that failed or whose output could not
    /// be collected.
    pub fn job_errors(&self) -> &[String] {
        &self.job_errors
    }

    fn join(&mut self, blackboard: &mut Blackboard) -> TaskState {
        let mut results = Map::new();
        let mut successes = 0usize;

        for (job, tag) in &self.jobs {
            match job.state() {
                JobState::Completed => match self.collector.collect_job(&mut results, job, tag) {
                    Ok(()) => successes += 1,
                    Err(err) => {
                        warn!(job = job.name(), error = %err, "failed to collect job output");
                        self.job_errors
                            .push(format!("{}: failed to collect output: {err}", job.name()));
                    }
                },
                _ => {
                    let reason = job.error().unwrap_or_else(|| "failed".to_string());
                    self.job_errors.push(format!("{}: {reason}", job.name()));
                }
            }
        }

        for (job, tag) in &self.jobs {
            if let Err(err) = self.collector.cleanup_job(job, tag) {
                warn!(job = job.name(), error = %err, "job cleanup failed");
            }
        }

        for message in &self.job_errors {
            self.base.add_error(blackboard, message.clone());
        }
        if !results.is_empty() {
            self.base.store_results(blackboard, Value::Object(results));
        }

        if successes > 0 {
            self.base.done(blackboard)
        } else {
            self.base
                .fail(blackboard, ShimError::user("no successful jobs"))
        }
    }
}

impl<C: JobCollector> Task for MultiJobExecution<C> {
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
        if self.jobs.iter().all(|(job, _)| job.state().is_terminal()) {
            return self.join(blackboard);
        }
        self.base.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SchedulerError;
    use crate::domain::models::ResourceCaps;
    use crate::domain::ports::JobControl;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct ManualScheduler {
        controls: Vec<JobControl>,
    }

    impl Scheduler for ManualScheduler {
        fn schedule_job(
            &mut self,
            name: &str,
            spec: JobSpec,
            work_dir: &Path,
        ) -> Result<Job, SchedulerError> {
            let (job, control) = Job::channel(name, spec, work_dir);
            self.controls.push(control);
            Ok(job)
        }

        fn caps(&self) -> ResourceCaps {
            ResourceCaps::default()
        }
    }

    #[derive(Default)]
    struct Counting {
        cleanups: Arc<AtomicUsize>,
        reject: Option<&'static str>,
    }

    impl JobCollector for Counting {
        type Tag = String;

        fn collect_job(
            &self,
            results: &mut Map<String, Value>,
            _job: &Job,
            tag: &String,
        ) -> Result<(), ShimError> {
            if self.reject == Some(tag.as_str()) {
                return Err(ShimError::internal("garbled output"));
            }
            results.insert(tag.clone(), json!({ "n_reads": 10 }));
            Ok(())
        }

        fn cleanup_job(&self, _job: &Job, _tag: &String) -> Result<(), ShimError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Err(ShimError::internal("cleanup errors are only logged"))
        }
    }

    fn fan_out(
        bb: &mut Blackboard,
        sched: &mut ManualScheduler,
        collector: Counting,
        inputs: &[&str],
    ) -> MultiJobExecution<Counting> {
        let base = ServiceExecution::start("RM", "1", &Service::new("ReadsMetrics"), None, bb);
        let mut exec = MultiJobExecution::new(base, collector);
        for input in inputs {
            exec.add_job(
                bb,
                sched,
                &format!("fastq-stats_{input}"),
                JobSpec::shell("fastq-stats", "fastq-stats"),
                Path::new("ReadsMetrics"),
                (*input).to_string(),
            )
            .unwrap();
        }
        exec
    }

    #[test]
    fn test_best_of_n_completes_with_partial_results() {
        let mut bb = Blackboard::new();
        let mut sched = ManualScheduler::default();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let collector = Counting {
            cleanups: cleanups.clone(),
            reject: None,
        };
        let mut exec = fan_out(&mut bb, &mut sched, collector, &["a", "b", "c"]);

        sched.controls[0].complete();
        sched.controls[1].fail("exit status 1");
        assert_eq!(exec.report(&mut bb), TaskState::Started);
        assert!(bb.get("services/ReadsMetrics/results").is_none());

        sched.controls[2].complete();
        assert_eq!(exec.report(&mut bb), TaskState::Completed);
        assert_eq!(exec.job_errors(), &["fastq-stats_b: exit status 1".to_string()]);
        let results = bb.get("services/ReadsMetrics/results").unwrap();
        assert!(results.get("a").is_some());
        assert!(results.get("b").is_none());
        assert!(results.get("c").is_some());
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);
        assert_eq!(
            bb.get("services/ReadsMetrics/errors"),
            Some(&json!(["fastq-stats_b: exit status 1"]))
        );
    }

    #[test]
    fn test_all_jobs_failed_fails_task() {
        let mut bb = Blackboard::new();
        let mut sched = ManualScheduler::default();
        let mut exec = fan_out(&mut bb, &mut sched, Counting::default(), &["a", "b"]);

        sched.controls[0].fail("timed out");
        sched.controls[1].fail("exit status 3");
        assert_eq!(exec.report(&mut bb), TaskState::Failed);
        assert_eq!(exec.job_errors().len(), 2);
        assert_eq!(exec.error(), Some("no successful jobs"));
        assert!(bb.get("services/ReadsMetrics/results").is_none());
    }

    #[test]
    fn test_collector_error_costs_only_that_job() {
        let mut bb = Blackboard::new();
        let mut sched = ManualScheduler::default();
        let collector = Counting {
            reject: Some("a"),
            ..Counting::default()
        };
        let mut exec = fan_out(&mut bb, &mut sched, collector, &["a", "b"]);

        sched.controls[0].complete();
        sched.controls[1].complete();
        assert_eq!(exec.report(&mut bb), TaskState::Completed);
        assert_eq!(exec.job_errors().len(), 1);
        assert!(exec.job_errors()[0].starts_with("fastq-stats_a: failed to collect output"));
    }

    #[test]
    fn test_job_specs_recorded() {
        let mut bb = Blackboard::new();
        let mut sched = ManualScheduler::default();
        let exec = fan_out(&mut bb, &mut sched, Counting::default(), &["a", "b"]);
        assert_eq!(exec.job_count(), 2);
        assert_eq!(
            bb.get_str("services/ReadsMetrics/task_info/jobs/fastq-stats_a/command"),
            Some("sh")
        );
    }
}
