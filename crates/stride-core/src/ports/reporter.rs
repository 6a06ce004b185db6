//! Reporter port - delivers progress / completion / failure notifications to
//! the task's report channel.
//!
//! Failures are logged by the scheduler and never roll back a transition.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ProgressReport, Step, Task};

#[derive(Debug, Error)]
#[error("report delivery failed: {0}")]
pub struct ReportError(pub String);

#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called after `step` completed and the progress predicate held. The
    /// returned record is appended to `task.progress_reports`.
    async fn report_progress(
        &self,
        task: &Task,
        step: &Step,
    ) -> Result<Option<ProgressReport>, ReportError>;

    async fn report_completion(&self, task: &Task) -> Result<(), ReportError>;

    async fn report_failure(&self, task: &Task, error: &str) -> Result<(), ReportError>;
}
