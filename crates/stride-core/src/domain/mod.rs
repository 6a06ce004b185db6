//! Domain model: ids, tasks and steps with their state machines, retry
//! classification, progress predicate and text synthesis.
//!
//! Everything here is pure: no I/O, no clocks, no async.

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod retry;
pub mod spec;
pub mod step;
pub mod task;
pub mod text;

pub use self::errors::{StoreError, TaskError};
pub use self::events::TaskEvent;
pub use self::ids::{StepId, TaskId};
pub use self::outcome::{OutcomeStatus, StepOutcome};
pub use self::progress::should_report_progress;
pub use self::prompt::{TextLimits, build_step_prompt, final_result, final_summary};
pub use self::report::ProgressReport;
pub use self::retry::{RetryDecision, RetryPolicy};
pub use self::spec::{MIN_STEP_TIMEOUT_MS, StepSpec, TaskDefaults, TaskSpec};
pub use self::step::{Step, StepStatus};
pub use self::task::{Task, TaskStatus, WORKFLOW_METADATA_KEY};
pub use self::text::truncate_chars;
