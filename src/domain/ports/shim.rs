use crate::domain::models::{Blackboard, Service, TaskState};

use super::scheduler::Scheduler;

/// One execution of a service, driven by repeated calls to `report`.
pub trait Task: Send {
    fn service(&self) -> &Service;

    /// Fan-out id distinguishing invocations of the same service.
    fn execution_id(&self) -> Option<&str>;

    fn state(&self) -> TaskState;

    /// Error message once failed.
    fn error(&self) -> Option<&str>;

    /// Advance the task by inspecting its jobs. Never blocks.
    fn report(&mut self, blackboard: &mut Blackboard) -> TaskState;
}

/// Adapter between one service and the external tool that implements it.
pub trait ServiceShim: Send + Sync {
    /// Shim name, recorded in the task info.
    fn name(&self) -> &str;

    /// Backend version, recorded in the task info.
    fn version(&self) -> &str;

    /// Validate inputs, submit jobs and return a task that is either
    /// `STARTED` or, for invalid inputs, already `FAILED`.
    fn execute(
        &self,
        service: &Service,
        execution_id: Option<&str>,
        blackboard: &mut Blackboard,
        scheduler: &mut dyn Scheduler,
    ) -> Box<dyn Task>;
}
