//! Ports - traits at every external seam.
//!
//! The scheduler depends only on these; production and test implementations
//! are swapped in through `RunnerBuilder`.

pub mod clock;
pub mod event_sink;
pub mod executor;
pub mod id_generator;
pub mod reporter;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, EventSinkError};
pub use self::executor::{ExecutorError, StepExecutionRequest, StepExecutor};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::reporter::{ReportError, Reporter};
pub use self::task_store::TaskStore;
