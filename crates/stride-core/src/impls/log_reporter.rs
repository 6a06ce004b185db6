//! Reporter that writes notifications to the log.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{ProgressReport, Step, Task};
use crate::ports::{ReportError, Reporter};

/// Emits progress / completion / failure as structured `tracing` events on
/// the `stride::report` target. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    async fn report_progress(
        &self,
        task: &Task,
        step: &Step,
    ) -> Result<Option<ProgressReport>, ReportError> {
        let completed = task.completed_steps();
        let total = task.total_steps();
        let message = format!(
            "{}: step {}/{} done ({})",
            task.name,
            completed,
            total,
            step.description
        );
        info!(
            target: "stride::report",
            task_id = %task.id,
            channel = %task.report_channel,
            recipient = task.report_to.as_deref().unwrap_or("-"),
            topic = task.report_topic_id.as_deref().unwrap_or("-"),
            "{message}"
        );

        Ok(Some(ProgressReport {
            step_index: step.index,
            completed_steps: completed,
            total_steps: total,
            channel: task.report_channel.clone(),
            recipient: task.report_to.clone(),
            message,
            sent_at: task.updated_at,
        }))
    }

    async fn report_completion(&self, task: &Task) -> Result<(), ReportError> {
        info!(
            target: "stride::report",
            task_id = %task.id,
            channel = %task.report_channel,
            summary = task.final_summary.as_deref().unwrap_or(""),
            "{} completed",
            task.name
        );
        Ok(())
    }

    async fn report_failure(&self, task: &Task, error: &str) -> Result<(), ReportError> {
        warn!(
            target: "stride::report",
            task_id = %task.id,
            channel = %task.report_channel,
            error,
            "{} failed",
            task.name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_task, ts};

    #[tokio::test]
    async fn progress_record_describes_the_completed_step() {
        let mut task = sample_task(3);
        task.report_to = Some("#ops".to_string());
        task.complete_current_step(Some("ok".to_string()), ts(5));

        let report = LogReporter
            .report_progress(&task, &task.steps[0])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.step_index, 0);
        assert_eq!((report.completed_steps, report.total_steps), (1, 3));
        assert_eq!(report.recipient.as_deref(), Some("#ops"));
        assert_eq!(report.message, "sample: step 1/3 done (step 1)");
        assert_eq!(report.sent_at, ts(5));
    }
}
