//! Task record and its state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::ids::TaskId;
use super::report::ProgressReport;
use super::step::{Step, StepStatus};

/// Metadata key marking a task as part of an external workflow.
pub const WORKFLOW_METADATA_KEY: &str = "workflow";

/// Task status.
///
/// State transitions:
/// - Pending -> InProgress (promotion, when a concurrency slot is free)
/// - InProgress -> Completed (last step completed)
/// - InProgress -> Failed (a step exhausted its retries)
/// - Pending | InProgress -> Paused -> Pending (pause / resume)
/// - Pending | InProgress | Paused -> Cancelled
///
/// Terminal states (Completed, Cancelled, Failed) are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Paused,
        TaskStatus::Cancelled,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

/// A user-defined unit of work decomposed into ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub steps: Vec<Step>,

    /// Index of the first step that is not completed. Only ever increases.
    #[serde(default)]
    pub current_step_index: usize,

    /// Correlation id handed to the executor, stable for the task's lifetime.
    pub session_key: String,

    #[serde(default)]
    pub step_interval_ms: u64,
    pub max_retries: u32,
    pub timeout_per_step_ms: u64,

    pub report_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_topic_id: Option<String>,
    pub report_every_steps: u32,

    #[serde(default)]
    pub progress_reports: Vec<ProgressReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,

    /// Opaque collaborator extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|step| step.is_completed()).count()
    }

    /// The step at `current_step_index`, if any remain.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.current_step_index)
    }

    pub fn has_remaining_steps(&self) -> bool {
        self.current_step_index < self.steps.len()
    }

    /// External workflow reference from metadata, if any.
    pub fn workflow_ref(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get(WORKFLOW_METADATA_KEY)?
            .as_str()
            .filter(|workflow| !workflow.is_empty())
    }

    /// Has `step_interval_ms` elapsed since the previous step completed?
    pub fn is_step_interval_elapsed(&self, now: DateTime<Utc>) -> bool {
        if self.step_interval_ms == 0 || self.current_step_index == 0 {
            return true;
        }
        let Some(previous) = self
            .steps
            .get(self.current_step_index - 1)
            .and_then(|step| step.completed_at)
        else {
            return true;
        };
        let interval = Duration::milliseconds(i64::try_from(self.step_interval_ms).unwrap_or(i64::MAX));
        previous.checked_add_signed(interval).is_none_or(|due| due <= now)
    }

    /// Pending -> InProgress. The caller has already checked the status.
    pub fn promote(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.updated_at = now;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::InProgress) {
            return Err(self.invalid_transition("pause"));
        }
        self.status = TaskStatus::Paused;
        self.updated_at = now;
        Ok(())
    }

    /// Paused -> Pending (re-enters the promotion queue).
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        if self.status != TaskStatus::Paused {
            return Err(self.invalid_transition("resume"));
        }
        self.status = TaskStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    /// Cancel the task and every step that has not finished.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        if self.is_terminal() {
            return Err(self.invalid_transition("cancel"));
        }
        for step in &mut self.steps {
            step.cancel();
        }
        self.status = TaskStatus::Cancelled;
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Complete the current step and move the index forward.
    pub fn complete_current_step(&mut self, result: Option<String>, now: DateTime<Utc>) {
        if let Some(step) = self.current_step_mut() {
            step.complete(result, now);
            self.current_step_index += 1;
        }
        self.updated_at = now;
    }

    /// Mark the task completed with its synthesized summary.
    pub fn finish(
        &mut self,
        final_summary: String,
        final_result: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.final_summary = Some(final_summary);
        self.final_result = final_result;
    }

    /// Mark the task failed. The failing step already carries its error.
    pub fn fail(&mut self, final_summary: String, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.final_summary = Some(final_summary);
    }

    /// Steps left in flight by an interrupted run.
    pub fn interrupted_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::InProgress)
    }

    fn invalid_transition(&self, action: &'static str) -> TaskError {
        TaskError::InvalidTransition {
            id: self.id,
            from: self.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_task, ts};
    use rstest::rstest;

    #[rstest]
    #[case::pending(TaskStatus::Pending, false)]
    #[case::in_progress(TaskStatus::InProgress, false)]
    #[case::paused(TaskStatus::Paused, false)]
    #[case::cancelled(TaskStatus::Cancelled, true)]
    #[case::completed(TaskStatus::Completed, true)]
    #[case::failed(TaskStatus::Failed, true)]
    fn terminal_statuses(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[rstest]
    #[case::pending(TaskStatus::Pending, true)]
    #[case::in_progress(TaskStatus::InProgress, true)]
    #[case::paused(TaskStatus::Paused, false)]
    #[case::completed(TaskStatus::Completed, false)]
    #[case::failed(TaskStatus::Failed, false)]
    #[case::cancelled(TaskStatus::Cancelled, false)]
    fn pause_is_only_valid_from_active_states(#[case] from: TaskStatus, #[case] ok: bool) {
        let mut task = sample_task(2);
        task.status = from;

        let result = task.pause(ts(1));

        assert_eq!(result.is_ok(), ok);
        if ok {
            assert_eq!(task.status, TaskStatus::Paused);
        } else {
            assert!(matches!(
                result,
                Err(TaskError::InvalidTransition { action: "pause", .. })
            ));
            assert_eq!(task.status, from);
        }
    }

    #[rstest]
    #[case::paused(TaskStatus::Paused, true)]
    #[case::pending(TaskStatus::Pending, false)]
    #[case::in_progress(TaskStatus::InProgress, false)]
    #[case::completed(TaskStatus::Completed, false)]
    fn resume_returns_paused_task_to_pending(#[case] from: TaskStatus, #[case] ok: bool) {
        let mut task = sample_task(1);
        task.status = from;

        assert_eq!(task.resume(ts(1)).is_ok(), ok);
        if ok {
            assert_eq!(task.status, TaskStatus::Pending);
        }
    }

    #[test]
    fn cancel_marks_open_steps_cancelled() {
        let mut task = sample_task(3);
        task.complete_current_step(Some("first".to_string()), ts(1));
        task.steps[1].start(ts(2));

        task.cancel(ts(3)).unwrap();

        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.completed_at, Some(ts(3)));
        assert_eq!(task.steps[0].status, StepStatus::Completed);
        assert_eq!(task.steps[1].status, StepStatus::Cancelled);
        assert_eq!(task.steps[2].status, StepStatus::Cancelled);
    }

    #[test]
    fn cancel_rejects_terminal_task() {
        let mut task = sample_task(1);
        task.status = TaskStatus::Completed;

        let err = task.cancel(ts(1)).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { from: TaskStatus::Completed, .. }));
    }

    #[test]
    fn completing_steps_advances_index_monotonically() {
        let mut task = sample_task(2);
        assert_eq!(task.current_step_index, 0);

        task.complete_current_step(Some("a".to_string()), ts(1));
        assert_eq!(task.current_step_index, 1);
        assert!(task.has_remaining_steps());

        task.complete_current_step(None, ts(2));
        assert_eq!(task.current_step_index, 2);
        assert!(!task.has_remaining_steps());
        assert_eq!(task.completed_steps(), 2);

        // Nothing left to complete: the index stays put.
        task.complete_current_step(None, ts(3));
        assert_eq!(task.current_step_index, 2);
    }

    #[test]
    fn step_interval_gates_only_after_a_completed_step() {
        let mut task = sample_task(2);
        task.step_interval_ms = 10_000;
        assert!(task.is_step_interval_elapsed(ts(0)));

        task.complete_current_step(None, ts(0));
        assert!(!task.is_step_interval_elapsed(ts(5)));
        assert!(task.is_step_interval_elapsed(ts(10)));
    }

    #[test]
    fn workflow_ref_reads_metadata() {
        let mut task = sample_task(1);
        assert_eq!(task.workflow_ref(), None);

        task.metadata = Some(serde_json::json!({ "workflow": "wf-42" }));
        assert_eq!(task.workflow_ref(), Some("wf-42"));

        task.metadata = Some(serde_json::json!({ "workflow": "" }));
        assert_eq!(task.workflow_ref(), None);
    }

    #[test]
    fn status_parses_from_cli_spellings() {
        assert_eq!("in-progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert_eq!("Completed".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
