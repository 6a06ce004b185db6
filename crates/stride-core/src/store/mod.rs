//! The task collection document and the stores that persist it.
//!
//! `StoreFile` helpers only mutate memory; callers persist with
//! `TaskStore::save` afterwards.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryTaskStore;

use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskError, TaskId, TaskStatus};

/// Current on-disk format version.
pub const STORE_VERSION: u32 = 1;

/// `{ "version": 1, "tasks": [ ... ] }`
///
/// Tasks are kept in creation order; promotion is FIFO over this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreFile {
    pub version: u32,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            tasks: Vec::new(),
        }
    }
}

impl StoreFile {
    /// Append a task and return it.
    pub fn add_task(&mut self, task: Task) -> &Task {
        self.tasks.push(task);
        let last = self.tasks.len() - 1;
        &self.tasks[last]
    }

    pub fn find_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn find_task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Apply `update` to the task with `id`. Unknown ids are an error.
    pub fn update_task<F>(&mut self, id: TaskId, update: F) -> Result<&Task, TaskError>
    where
        F: FnOnce(&mut Task),
    {
        let task = self.find_task_mut(id).ok_or(TaskError::NotFound(id))?;
        update(task);
        Ok(task)
    }

    /// Remove and return the task with `id`.
    pub fn remove_task(&mut self, id: TaskId) -> Option<Task> {
        let position = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(position))
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|task| task.status == status).count()
    }

    /// Ids with `status`, in stored order.
    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|task| task.status == status)
            .map(|task| task.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_task;

    #[test]
    fn add_find_remove() {
        let mut store = StoreFile::default();
        let task = sample_task(1);
        let id = task.id;

        assert_eq!(store.add_task(task).id, id);
        assert!(store.find_task(id).is_some());

        let removed = store.remove_task(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(store.find_task(id).is_none());
        assert!(store.remove_task(id).is_none());
    }

    #[test]
    fn update_task_errors_on_unknown_id() {
        let mut store = StoreFile::default();
        let missing = sample_task(1).id;

        let err = store
            .update_task(missing, |task| task.name = "x".to_string())
            .unwrap_err();
        assert!(matches!(err, TaskError::NotFound(id) if id == missing));
    }

    #[test]
    fn update_task_returns_updated_task() {
        let mut store = StoreFile::default();
        let id = store.add_task(sample_task(1)).id;

        let updated = store
            .update_task(id, |task| task.name = "renamed".to_string())
            .unwrap();
        assert_eq!(updated.name, "renamed");
    }

    #[test]
    fn status_queries_preserve_stored_order() {
        let mut store = StoreFile::default();
        let first = store.add_task(sample_task(1)).id;
        let mut running = sample_task(1);
        running.status = TaskStatus::InProgress;
        store.add_task(running);
        let third = store.add_task(sample_task(1)).id;

        assert_eq!(store.ids_with_status(TaskStatus::Pending), vec![first, third]);
        assert_eq!(store.count_with_status(TaskStatus::InProgress), 1);
    }

    #[test]
    fn missing_tasks_field_deserializes_as_empty() {
        let store: StoreFile = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert!(store.tasks.is_empty());
    }
}
