//! Management API: create / cancel / pause / resume / remove / query.
//!
//! Transitions are synchronous with respect to the tick: they take effect in
//! the cache and on disk before the call returns. A failed save rolls the
//! cache back, so a returned error means nothing changed.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::runner::TaskRunner;
use super::status::TaskCounts;
use crate::domain::{Task, TaskError, TaskEvent, TaskId, TaskSpec, TaskStatus};

/// Query filter for `list_tasks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status == status)
    }
}

impl TaskRunner {
    /// Validate `spec`, insert it as a pending task and persist.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task, TaskError> {
        let task = spec.into_task(
            self.ids.as_ref(),
            &self.config.task_defaults(),
            self.clock.now(),
        )?;

        let mut cache = self.cache.lock().await;
        cache.add_task(task.clone());
        if let Err(err) = self.persist(&cache).await {
            cache.remove_task(task.id);
            return Err(err.into());
        }

        info!(task_id = %task.id, steps = task.total_steps(), "task created");
        Ok(task)
    }

    /// Cancel a non-terminal task and every step that has not finished.
    ///
    /// A step already running is not interrupted; its result is discarded.
    pub async fn cancel_task(&self, id: TaskId) -> Result<Task, TaskError> {
        let task = self.transition(id, Task::cancel).await?;
        info!(task_id = %id, "task cancelled");
        self.emit(TaskEvent::Cancelled { task: task.clone() });
        Ok(task)
    }

    /// Pending | InProgress -> Paused.
    pub async fn pause_task(&self, id: TaskId) -> Result<Task, TaskError> {
        let task = self.transition(id, Task::pause).await?;
        info!(task_id = %id, "task paused");
        Ok(task)
    }

    /// Paused -> Pending. The task waits for a free slot like a new one.
    pub async fn resume_task(&self, id: TaskId) -> Result<Task, TaskError> {
        let task = self.transition(id, Task::resume).await?;
        info!(task_id = %id, "task resumed");
        Ok(task)
    }

    /// Delete a terminal task from the store.
    pub async fn remove_task(&self, id: TaskId) -> Result<Task, TaskError> {
        let mut cache = self.cache.lock().await;
        let position = cache
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskError::NotFound(id))?;
        let status = cache.tasks[position].status;
        if !status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                id,
                from: status,
                action: "remove",
            });
        }

        let removed = cache.remove_task(id).ok_or(TaskError::NotFound(id))?;
        if let Err(err) = self.persist(&cache).await {
            cache.tasks.insert(position, removed);
            return Err(err.into());
        }

        info!(task_id = %id, "task removed");
        Ok(removed)
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.cache.lock().await.find_task(id).cloned()
    }

    /// Tasks matching `filter`, in creation order.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        self.cache
            .lock()
            .await
            .tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect()
    }

    pub async fn counts(&self) -> TaskCounts {
        TaskCounts::from_tasks(&self.cache.lock().await.tasks)
    }

    async fn transition<F>(&self, id: TaskId, apply: F) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut Task, DateTime<Utc>) -> Result<(), TaskError>,
    {
        let now = self.clock.now();
        let mut cache = self.cache.lock().await;
        let task = cache.find_task_mut(id).ok_or(TaskError::NotFound(id))?;
        let before = task.clone();
        apply(task, now)?;
        let after = task.clone();

        if let Err(err) = self.persist(&cache).await {
            if let Some(task) = cache.find_task_mut(id) {
                *task = before;
            }
            return Err(err.into());
        }
        Ok(after)
    }
}
