//! Status counts for observability.

use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskStatus};

/// Number of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub paused: usize,
    pub cancelled: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            *counts.slot(task.status) += 1;
        }
        counts
    }

    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Paused => self.paused,
            TaskStatus::Cancelled => self.cancelled,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
        }
    }

    pub fn total(&self) -> usize {
        TaskStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }

    fn slot(&mut self, status: TaskStatus) -> &mut usize {
        match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Paused => &mut self.paused,
            TaskStatus::Cancelled => &mut self.cancelled,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_task;

    #[test]
    fn counts_every_status() {
        let mut tasks = Vec::new();
        for status in [
            TaskStatus::Pending,
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Failed,
        ] {
            let mut task = sample_task(1);
            task.status = status;
            tasks.push(task);
        }

        let counts = TaskCounts::from_tasks(&tasks);

        assert_eq!(counts.pending, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.get(TaskStatus::Completed), 0);
        assert_eq!(counts.total(), 4);
    }
}
