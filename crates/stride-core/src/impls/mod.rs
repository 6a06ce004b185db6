//! Implementations - concrete collaborators for the ports.
//!
//! - `CommandExecutor`: runs an external agent command per step
//! - `LogReporter`: reports through `tracing`
//! - `WorkflowFilter`: forwards completions of workflow tasks to a sink

pub mod command_executor;
pub mod log_reporter;
pub mod workflow_filter;

pub use self::command_executor::CommandExecutor;
pub use self::log_reporter::LogReporter;
pub use self::workflow_filter::WorkflowFilter;
