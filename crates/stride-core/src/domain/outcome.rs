//! Step executor response.
//!
//! This is the wire shape the executor hands back for one step:
//! `{ "status": "ok" | "error", "summary"?: string, "error"?: string }`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: OutcomeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            summary: Some(summary.into()),
            error: None,
        }
    }

    /// Success without a summary.
    pub fn empty() -> Self {
        Self {
            status: OutcomeStatus::Ok,
            summary: None,
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            summary: None,
            error: Some(reason.into()),
        }
    }

    /// `Ok(summary)` on success, `Err(message)` when the executor reported an error.
    pub fn into_result(self) -> Result<Option<String>, String> {
        match self.status {
            OutcomeStatus::Ok => Ok(self.summary),
            OutcomeStatus::Error => Err(self
                .error
                .filter(|error| !error.trim().is_empty())
                .unwrap_or_else(|| "step executor reported an error".to_string())),
        }
    }
}
