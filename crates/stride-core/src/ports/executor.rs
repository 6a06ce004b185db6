//! StepExecutor port - the agent turn that performs one step's work.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::StepOutcome;

/// Request handed to the executor for one step.
///
/// Owned by this crate: it carries exactly what a step needs and nothing from
/// any other subsystem's job model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionRequest {
    /// Step prompt with task header and prior-step context.
    pub message: String,
    /// Stable per-task correlation id.
    pub session_key: String,
    pub timeout_seconds: u64,
    /// Whether the executor should deliver its output to a channel itself.
    pub deliver: bool,
}

impl StepExecutionRequest {
    pub fn new(message: String, session_key: String, timeout: Duration) -> Self {
        Self {
            message,
            session_key,
            // whole seconds, rounded up so the executor never gets less than the budget
            timeout_seconds: u64::try_from(timeout.as_millis().div_ceil(1000))
                .unwrap_or(u64::MAX)
                .max(1),
            deliver: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to start executor: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("executor I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("step timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

/// Executes one step. Re-invoking with the same request after a failure must
/// be safe: the scheduler retries by calling again.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, request: StepExecutionRequest) -> Result<StepOutcome, ExecutorError>;
}
