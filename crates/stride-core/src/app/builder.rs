//! RunnerBuilder - wiring of a `TaskRunner`.
//!
//! Fail-fast: the config is validated and the required collaborators are
//! checked in `build()`, before anything touches the store.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::config::{ConfigError, RunnerConfig};
use super::runner::TaskRunner;
use crate::domain::{StoreError, TaskStatus};
use crate::impls::{LogReporter, WorkflowFilter};
use crate::ports::{
    Clock, EventSink, IdGenerator, Reporter, StepExecutor, SystemClock, TaskStore, UlidGenerator,
};

/// # Example
/// ```ignore
/// let runner = RunnerBuilder::new()
///     .config(config)
///     .store(JsonFileStore::new(path))
///     .executor(CommandExecutor::new("agent"))
///     .on_workflow_complete(hook)
///     .build()
///     .await?;
/// let runner = Arc::new(runner);
/// runner.start();
/// ```
pub struct RunnerBuilder {
    config: RunnerConfig,
    store: Option<Arc<dyn TaskStore>>,
    executor: Option<Arc<dyn StepExecutor>>,
    reporter: Option<Arc<dyn Reporter>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no step executor configured")]
    MissingExecutor,

    #[error("no task store configured")]
    MissingStore,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
            store: None,
            executor: None,
            reporter: None,
            clock: None,
            ids: None,
            sinks: Vec::new(),
        }
    }

    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: impl TaskStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn executor(mut self, executor: impl StepExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Defaults to `LogReporter`.
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Defaults to a `UlidGenerator` on the runner's clock.
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Register a sink for every terminal task event.
    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Register a sink for tasks that belong to an external workflow.
    pub fn on_workflow_complete(self, sink: impl EventSink + 'static) -> Self {
        self.event_sink(WorkflowFilter::new(sink))
    }

    /// Validate, claim and load the store, and return a stopped runner.
    ///
    /// The store stays claimed for the life of the runner: a second runner on
    /// the same JSON file fails with `BuildError::Store(StoreError::Locked)`.
    pub async fn build(self) -> Result<TaskRunner, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let executor = self.executor.ok_or(BuildError::MissingExecutor)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let reporter = self.reporter.unwrap_or_else(|| Arc::new(LogReporter));

        store.acquire().await?;
        let loaded = store.load().await;
        for task in &loaded.tasks {
            if task.status != TaskStatus::InProgress {
                continue;
            }
            for step in task.interrupted_steps() {
                warn!(
                    task_id = %task.id,
                    step_index = step.index,
                    retry_count = step.retry_count,
                    "step was interrupted, it will be executed again"
                );
            }
        }
        info!(
            tasks = loaded.tasks.len(),
            sinks = self.sinks.len(),
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            "task store loaded"
        );

        Ok(TaskRunner {
            config: self.config,
            store,
            executor,
            reporter,
            clock,
            ids,
            sinks: self.sinks,
            cache: Mutex::new(loaded),
            tick_gate: Mutex::new(()),
            ticker: std::sync::Mutex::new(None),
        })
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTaskStore;
    use crate::test_support::ScriptedExecutor;

    #[tokio::test]
    async fn build_requires_an_executor() {
        let result = RunnerBuilder::new()
            .store(InMemoryTaskStore::new())
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::MissingExecutor)));
    }

    #[tokio::test]
    async fn build_requires_a_store() {
        let result = RunnerBuilder::new()
            .executor(ScriptedExecutor::new())
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::MissingStore)));
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let config = RunnerConfig {
            max_concurrent_tasks: 0,
            ..RunnerConfig::default()
        };
        let result = RunnerBuilder::new()
            .config(config)
            .store(InMemoryTaskStore::new())
            .executor(ScriptedExecutor::new())
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[tokio::test]
    async fn build_loads_existing_tasks() {
        let store = InMemoryTaskStore::new();
        let mut file = crate::store::StoreFile::default();
        file.add_task(crate::test_support::sample_task(2));
        store.save(&file).await.unwrap();

        let runner = RunnerBuilder::new()
            .store(store)
            .executor(ScriptedExecutor::new())
            .build()
            .await
            .unwrap();

        assert_eq!(runner.counts().await.pending, 1);
        assert!(!runner.is_running());
    }
}
