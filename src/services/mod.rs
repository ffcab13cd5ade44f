pub mod execution;
pub mod executor;
pub mod multi_job;
pub mod shim_registry;
pub mod single_job;
pub mod workflow_resolver;

pub use execution::ServiceExecution;
pub use executor::{Executor, RunOutcome, Step};
pub use multi_job::{JobCollector, MultiJobExecution};
pub use shim_registry::ShimRegistry;
pub use single_job::{OutputCollector, SingleJobExecution};
pub use workflow_resolver::WorkflowResolver;
