use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::errors::SchedulerError;
use crate::domain::models::{JobSpec, JobState, JobStatus, ResourceCaps};

/// Handle to one submitted external job.
///
/// The scheduler keeps the sending half of the status channel; reading state
/// never blocks.
#[derive(Debug)]
pub struct Job {
    name: String,
    spec: JobSpec,
    work_dir: PathBuf,
    status: watch::Receiver<JobStatus>,
}

impl Job {
    /// Create a job handle together with the controller that drives its status.
    pub fn channel(
        name: impl Into<String>,
        spec: JobSpec,
        work_dir: impl Into<PathBuf>,
    ) -> (Self, JobControl) {
        let (tx, rx) = watch::channel(JobStatus::default());
        let job = Self {
            name: name.into(),
            spec,
            work_dir: work_dir.into(),
            status: rx,
        };
        (job, JobControl { tx: Arc::new(tx) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn state(&self) -> JobState {
        self.status.borrow().state
    }

    /// Error text once the job has failed.
    pub fn error(&self) -> Option<String> {
        self.status.borrow().error.clone()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn stdout(&self) -> PathBuf {
        self.work_dir.join("stdout")
    }

    pub fn stderr(&self) -> PathBuf {
        self.work_dir.join("stderr")
    }

    /// Resolve an output file inside the job's work directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }
}

/// Sending half of a job's status. Terminal states are final.
#[derive(Debug, Clone)]
pub struct JobControl {
    tx: Arc<watch::Sender<JobStatus>>,
}

impl JobControl {
    pub fn state(&self) -> JobState {
        self.tx.borrow().state
    }

    pub fn set_running(&self) {
        self.update(JobStatus::running());
    }

    pub fn complete(&self) {
        self.update(JobStatus::completed());
    }

    pub fn fail(&self, error: impl Into<String>) {
        self.update(JobStatus::failed(error));
    }

    fn update(&self, next: JobStatus) {
        self.tx.send_if_modified(|current| {
            if current.state.is_terminal() {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Runs external jobs under global resource ceilings.
pub trait Scheduler: Send {
    /// Submit a job. `work_dir` is relative to the scheduler's base directory.
    fn schedule_job(
        &mut self,
        name: &str,
        spec: JobSpec,
        work_dir: &Path,
    ) -> Result<Job, SchedulerError>;

    /// The ceilings jobs are admitted against.
    fn caps(&self) -> ResourceCaps;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_paths() {
        let (job, _control) = Job::channel("uf-stats-asm", JobSpec::new("uf", ["-t"]), "/tmp/w/x");
        assert_eq!(job.stdout(), PathBuf::from("/tmp/w/x/stdout"));
        assert_eq!(job.file_path("report.tsv"), PathBuf::from("/tmp/w/x/report.tsv"));
        assert_eq!(job.state(), JobState::Pending);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let (job, control) = Job::channel("j", JobSpec::new("true", Vec::<String>::new()), "w");
        control.set_running();
        assert_eq!(job.state(), JobState::Running);
        control.fail("exit status 1");
        control.complete();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.error().as_deref(), Some("exit status 1"));
    }
}
