//! Bookkeeping shared by every service execution.
//!
//! Each state transition is written to the Blackboard under
//! `services/<sid>[:<xid>]/task_info`, errors and warnings accumulate in
//! `services/<sid>/errors` and `services/<sid>/warnings`, and results go to
//! `services/<sid>/results`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::errors::ShimError;
use crate::domain::models::run_data::timestamp;
use crate::domain::models::{Blackboard, JobSpec, Service, TaskKey, TaskState};

#[derive(Debug)]
pub struct ServiceExecution {
    key: TaskKey,
    state: TaskState,
    error: Option<String>,
    started_at: DateTime<Utc>,
}

impl ServiceExecution {
    /// Enter `STARTED` and record who is running the service.
    pub fn start(
        shim: &str,
        version: &str,
        service: &Service,
        execution_id: Option<&str>,
        blackboard: &mut Blackboard,
    ) -> Self {
        let exec = Self {
            key: TaskKey::new(service.clone(), execution_id.map(String::from)),
            state: TaskState::Started,
            error: None,
            started_at: Utc::now(),
        };
        exec.put_task_info(blackboard, "shim", shim);
        exec.put_task_info(blackboard, "version", version);
        exec.put_task_info(blackboard, "service", service.as_str());
        if let Some(xid) = execution_id {
            exec.put_task_info(blackboard, "execution", xid);
        }
        exec.put_task_info(blackboard, "time/start", timestamp(exec.started_at));
        exec.put_task_info(blackboard, "status", TaskState::Started.as_str());
        info!(service = %exec.key, shim, version, "service execution started");
        exec
    }

    pub const fn key(&self) -> &TaskKey {
        &self.key
    }

    pub const fn service(&self) -> &Service {
        &self.key.service
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.key.execution_id.as_deref()
    }

    pub const fn state(&self) -> TaskState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub const fn is_started(&self) -> bool {
        matches!(self.state, TaskState::Started)
    }

    /// Blackboard path below this execution's namespace.
    pub fn path(&self, rel: &str) -> String {
        format!("services/{}/{rel}", self.key.path_segment())
    }

    pub fn put_task_info(&self, blackboard: &mut Blackboard, rel: &str, value: impl Into<Value>) {
        blackboard.put(&self.path(&format!("task_info/{rel}")), value);
    }

    pub fn add_warning(&self, blackboard: &mut Blackboard, warning: impl Into<String>) {
        blackboard.append_to(&self.path("warnings"), warning.into());
    }

    pub fn add_error(&self, blackboard: &mut Blackboard, message: impl Into<String>) {
        blackboard.append_to(&self.path("errors"), message.into());
    }

    /// Record the specification of a one-job service.
    pub fn store_job_spec(&self, blackboard: &mut Blackboard, spec: &JobSpec) {
        if let Ok(value) = serde_json::to_value(spec) {
            self.put_task_info(blackboard, "job", value);
        }
    }

    pub fn store_results(&self, blackboard: &mut Blackboard, results: impl Into<Value>) {
        blackboard.put(&self.path("results"), results);
    }

    pub fn done(&mut self, blackboard: &mut Blackboard) -> TaskState {
        self.transition(blackboard, TaskState::Completed, None)
    }

    /// Fail the execution, logging by severity: user errors as a short
    /// warning, internal errors in full.
    pub fn fail(&mut self, blackboard: &mut Blackboard, err: ShimError) -> TaskState {
        if !self.is_started() {
            return self.state;
        }
        match &err {
            ShimError::User(message) => {
                warn!(service = %self.key, error = %message, "service failed");
            }
            ShimError::Internal(_) => {
                error!(service = %self.key, error = ?err, "service failed with internal error");
            }
        }
        self.transition(blackboard, TaskState::Failed, Some(err.to_string()))
    }

    fn transition(
        &mut self,
        blackboard: &mut Blackboard,
        new_state: TaskState,
        error: Option<String>,
    ) -> TaskState {
        if !self.is_started() {
            return self.state;
        }
        self.state = new_state;

        let now = Utc::now();
        #[allow(clippy::cast_precision_loss)]
        let duration = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.put_task_info(blackboard, "time/end", timestamp(now));
        self.put_task_info(blackboard, "time/duration", duration);
        self.put_task_info(blackboard, "status", new_state.as_str());

        if let Some(message) = error {
            self.add_error(blackboard, message.clone());
            self.error = Some(message);
        } else {
            info!(service = %self.key, duration_secs = duration, "service execution completed");
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_records_task_info() {
        let mut bb = Blackboard::new();
        let exec = ServiceExecution::start("FastQC", "0.11.9", &Service::new("FastQC"), None, &mut bb);
        assert_eq!(exec.state(), TaskState::Started);
        assert_eq!(bb.get_str("services/FastQC/task_info/shim"), Some("FastQC"));
        assert_eq!(bb.get_str("services/FastQC/task_info/status"), Some("STARTED"));
        assert!(bb.contains("services/FastQC/task_info/time/start"));
    }

    #[test]
    fn test_fail_records_error_and_end_time() {
        let mut bb = Blackboard::new();
        let mut exec = ServiceExecution::start("s", "1", &Service::new("Quast"), None, &mut bb);
        let state = exec.fail(&mut bb, ShimError::user("no FASTA files to process"));
        assert_eq!(state, TaskState::Failed);
        assert_eq!(exec.error(), Some("no FASTA files to process"));
        assert_eq!(bb.get_str("services/Quast/task_info/status"), Some("FAILED"));
        assert_eq!(bb.get("services/Quast/errors"), Some(&json!(["no FASTA files to process"])));
        assert!(bb.contains("services/Quast/task_info/time/duration"));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut bb = Blackboard::new();
        let mut exec = ServiceExecution::start("s", "1", &Service::new("A"), None, &mut bb);
        exec.done(&mut bb);
        assert_eq!(exec.fail(&mut bb, ShimError::internal("late")), TaskState::Completed);
        assert!(bb.get("services/A/errors").is_none());
        assert_eq!(bb.get_str("services/A/task_info/status"), Some("COMPLETED"));
    }

    #[test]
    fn test_execution_id_namespaces_paths() {
        let mut bb = Blackboard::new();
        let exec = ServiceExecution::start("s", "1", &Service::new("A"), Some("x1"), &mut bb);
        assert_eq!(exec.path("results"), "services/A:x1/results");
        assert_eq!(bb.get_str("services/A:x1/task_info/execution"), Some("x1"));
    }
}
