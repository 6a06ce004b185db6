//! Step record and its state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StepId;

/// Step status.
///
/// State transitions:
/// - Pending -> InProgress -> Completed
/// - Pending -> InProgress -> Pending (retry scheduled, `retry_count` incremented)
/// - Pending -> InProgress -> Failed (retries exhausted)
/// - Pending | InProgress -> Cancelled (owning task cancelled)
///
/// An `InProgress` step found on load was interrupted by a crash and is
/// executed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    /// Can this step still be (re)started?
    pub fn is_open(self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::InProgress)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic unit of a task, executed through the step executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,

    /// Fixed 0-based position inside the task.
    pub index: usize,

    pub description: String,

    /// Instruction handed to the executor (context is added at execution time).
    pub prompt: String,

    pub status: StepStatus,

    /// Failed attempts so far. Never exceeds the task's `max_retries`.
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Truncated executor summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Last error message (kept while a retry is pending).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Retry backoff: the step is not started again before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(
        id: StepId,
        index: usize,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id,
            index,
            description: description.into(),
            prompt: prompt.into(),
            status: StepStatus::Pending,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            next_attempt_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Has the retry backoff (if any) elapsed?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_none_or(|at| at <= now)
    }

    /// Mark as running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::InProgress;
        self.started_at = Some(now);
        self.next_attempt_at = None;
    }

    /// Mark as completed with an (already truncated) result.
    pub fn complete(&mut self, result: Option<String>, now: DateTime<Utc>) {
        self.status = StepStatus::Completed;
        self.completed_at = Some(now);
        self.result = result;
        self.error = None;
        self.next_attempt_at = None;
    }

    /// Revert to pending for another attempt.
    pub fn schedule_retry(&mut self, error: String, next_attempt_at: Option<DateTime<Utc>>) {
        self.status = StepStatus::Pending;
        self.retry_count += 1;
        self.error = Some(error);
        self.next_attempt_at = next_attempt_at;
    }

    /// Mark as failed permanently (retries exhausted).
    pub fn fail(&mut self, error: String, now: DateTime<Utc>) {
        self.status = StepStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(error);
        self.next_attempt_at = None;
    }

    /// Cancel if the step has not finished yet. Returns whether it changed.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_open() {
            self.status = StepStatus::Cancelled;
            self.next_attempt_at = None;
            true
        } else {
            false
        }
    }
}
