//! Error taxonomy.
//!
//! - `TaskError`: surfaced to callers of the management API. Validation and
//!   transition errors never touch the store.
//! - `StoreError`: durable store I/O. Logged by the scheduler, surfaced by the
//!   management API.

use std::path::PathBuf;

use thiserror::Error;

use super::ids::TaskId;
use super::task::TaskStatus;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task must have at least one step")]
    NoSteps,

    #[error("task has {count} steps, the maximum is {max}")]
    TooManySteps { count: usize, max: usize },

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("cannot {action} task {id} while it is {from}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TaskError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store background task failed: {0}")]
    Background(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Another runner (possibly in another process) owns the store.
    #[error("task store is in use by another runner ({} is locked)", lock_path.display())]
    Locked { lock_path: PathBuf },
}
