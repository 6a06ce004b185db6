//! Progress report records accumulated on a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A progress notification that was delivered to the task's report channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Index of the step whose completion triggered the report.
    pub step_index: usize,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}
