//! Domain events fanned out to registered event sinks.

use super::task::Task;

/// Terminal task transitions observable by collaborators.
///
/// Each event carries a snapshot of the task as persisted at the time of the
/// transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Completed { task: Task },
    Failed { task: Task, error: String },
    Cancelled { task: Task },
}

impl TaskEvent {
    pub fn task(&self) -> &Task {
        match self {
            TaskEvent::Completed { task }
            | TaskEvent::Failed { task, .. }
            | TaskEvent::Cancelled { task } => task,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::Failed { .. } => "failed",
            TaskEvent::Cancelled { .. } => "cancelled",
        }
    }
}
