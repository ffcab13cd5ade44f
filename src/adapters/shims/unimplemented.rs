use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, Service, TaskState};
use crate::domain::ports::{Scheduler, ServiceShim, Task};
use crate::services::ServiceExecution;

/// Stand-in for services that have no backend yet: starts, then fails on
/// its first report.
pub struct UnimplementedShim;

impl ServiceShim for UnimplementedShim {
    fn name(&self) -> &str {
        "unimplemented"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn execute(
        &self,
        service: &Service,
        execution_id: Option<&str>,
        blackboard: &mut Blackboard,
        _scheduler: &mut dyn Scheduler,
    ) -> Box<dyn Task> {
        Box::new(UnimplementedExecution {
            base: ServiceExecution::start(
                self.name(),
                self.version(),
                service,
                execution_id,
                blackboard,
            ),
        })
    }
}

struct UnimplementedExecution {
    base: ServiceExecution,
}

impl Task for UnimplementedExecution {
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
        let message = format!("service {} is not implemented", self.base.service());
        self.base.fail(blackboard, ShimError::Internal(message))
    }
}
