//! Test doubles and fixtures.
//!
//! Compiled for unit tests and behind the `test-support` feature for the
//! integration tests in `tests/`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, mpsc};
use ulid::Ulid;

use crate::app::{RunnerBuilder, RunnerConfig, TaskRunner};
use crate::domain::{
    ProgressReport, Step, StepId, StepOutcome, Task, TaskEvent, TaskId, TaskSpec, TaskStatus,
};
use crate::ports::{
    EventSink, EventSinkError, ExecutorError, FixedClock, ReportError, Reporter,
    StepExecutionRequest, StepExecutor,
};
use crate::store::InMemoryTaskStore;

/// `2024-01-01T00:00:00Z + secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

/// A pending task named "sample" with `steps` steps ("step i" / "do step i").
pub fn sample_task(steps: usize) -> Task {
    let id = TaskId::from_ulid(Ulid::new());
    Task {
        id,
        name: "sample".to_string(),
        description: String::new(),
        status: TaskStatus::Pending,
        created_at: ts(0),
        updated_at: ts(0),
        completed_at: None,
        steps: (0..steps)
            .map(|index| {
                Step::new(
                    StepId::from_ulid(Ulid::new()),
                    index,
                    format!("step {}", index + 1),
                    format!("do step {}", index + 1),
                )
            })
            .collect(),
        current_step_index: 0,
        session_key: format!("stride:{}", id.as_ulid()),
        step_interval_ms: 0,
        max_retries: 3,
        timeout_per_step_ms: 600_000,
        report_channel: "log".to_string(),
        report_to: None,
        report_topic_id: None,
        report_every_steps: 1,
        progress_reports: Vec::new(),
        final_summary: None,
        final_result: None,
        metadata: None,
    }
}

/// Creation input matching `sample_task`.
pub fn sample_spec(steps: usize) -> TaskSpec {
    (0..steps).fold(TaskSpec::new("sample"), |spec, index| {
        spec.step(format!("step {}", index + 1), format!("do step {}", index + 1))
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One scripted executor response.
#[derive(Debug, Clone)]
pub enum Scripted {
    Outcome(StepOutcome),
    /// The executor call itself fails (`Err`).
    Fail(String),
    /// Never answers.
    Hang,
}

/// Answers from a queue of scripted responses, then `ok("done: <step>")`.
///
/// Clones share the script and the recorded requests.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<StepExecutionRequest>>>,
    gated: Arc<AtomicBool>,
    gate: ExecutorGate,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for `ExecutorGate::release` before answering.
    pub fn gated() -> Self {
        let executor = Self::default();
        executor.gated.store(true, Ordering::SeqCst);
        executor
    }

    pub fn gate(&self) -> ExecutorGate {
        self.gate.clone()
    }

    /// Stop waiting for the gate on later calls.
    pub fn ungate(&self) {
        self.gated.store(false, Ordering::SeqCst);
    }

    pub fn push(&self, outcome: StepOutcome) {
        lock(&self.script).push_back(Scripted::Outcome(outcome));
    }

    /// Executor-reported error (`status: "error"`).
    pub fn push_error(&self, error: &str) {
        self.push(StepOutcome::error(error));
    }

    /// Executor call fails outright.
    pub fn push_failure(&self, error: &str) {
        lock(&self.script).push_back(Scripted::Fail(error.to_string()));
    }

    pub fn push_hang(&self) {
        lock(&self.script).push_back(Scripted::Hang);
    }

    pub fn requests(&self) -> Vec<StepExecutionRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, request: StepExecutionRequest) -> Result<StepOutcome, ExecutorError> {
        let default = request
            .message
            .lines()
            .find_map(|line| line.strip_prefix("Step "))
            .map(|line| StepOutcome::ok(format!("done: {line}")))
            .unwrap_or_else(StepOutcome::empty);
        lock(&self.requests).push(request);
        let next = lock(&self.script).pop_front();

        if self.gated.load(Ordering::SeqCst) {
            self.gate.started.notify_one();
            self.gate.release.notified().await;
        }

        match next {
            Some(Scripted::Outcome(outcome)) => Ok(outcome),
            Some(Scripted::Fail(error)) => Err(ExecutorError::Failed(error)),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(default),
        }
    }
}

/// Lets a test observe that an executor call started and decide when it ends.
#[derive(Clone, Default)]
pub struct ExecutorGate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl ExecutorGate {
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// A reporter call seen by `RecordingReporter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Progress {
        task_id: TaskId,
        step_index: usize,
        completed: usize,
    },
    Completion {
        task_id: TaskId,
    },
    Failure {
        task_id: TaskId,
        error: String,
    },
}

#[derive(Clone, Default)]
pub struct RecordingReporter {
    recorded: Arc<Mutex<Vec<Recorded>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        lock(&self.recorded).clone()
    }

    pub fn progress_count(&self) -> usize {
        lock(&self.recorded)
            .iter()
            .filter(|call| matches!(call, Recorded::Progress { .. }))
            .count()
    }

    /// Record calls but answer with an error.
    pub fn fail_reports(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: Recorded) -> Result<(), ReportError> {
        lock(&self.recorded).push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportError("channel unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report_progress(
        &self,
        task: &Task,
        step: &Step,
    ) -> Result<Option<ProgressReport>, ReportError> {
        let completed = task.completed_steps();
        self.record(Recorded::Progress {
            task_id: task.id,
            step_index: step.index,
            completed,
        })?;
        Ok(Some(ProgressReport {
            step_index: step.index,
            completed_steps: completed,
            total_steps: task.total_steps(),
            channel: task.report_channel.clone(),
            recipient: task.report_to.clone(),
            message: format!("{completed}/{}", task.total_steps()),
            sent_at: task.updated_at,
        }))
    }

    async fn report_completion(&self, task: &Task) -> Result<(), ReportError> {
        self.record(Recorded::Completion { task_id: task.id })
    }

    async fn report_failure(&self, task: &Task, error: &str) -> Result<(), ReportError> {
        self.record(Recorded::Failure {
            task_id: task.id,
            error: error.to_string(),
        })
    }
}

/// Event sink that forwards every event to a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl RecordingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &TaskEvent) -> Result<(), EventSinkError> {
        self.tx
            .send(event.clone())
            .map_err(|err| EventSinkError(err.to_string()))
    }
}

/// A sink that always fails.
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn emit(&self, _event: &TaskEvent) -> Result<(), EventSinkError> {
        Err(EventSinkError("hook crashed".to_string()))
    }
}

/// A runner wired to in-memory doubles, with handles to each of them.
pub struct TestRig {
    pub runner: Arc<TaskRunner>,
    pub store: InMemoryTaskStore,
    pub executor: ScriptedExecutor,
    pub reporter: RecordingReporter,
    pub clock: FixedClock,
}

impl TestRig {
    pub async fn new(config: RunnerConfig) -> Self {
        Self::with(config, InMemoryTaskStore::new(), ScriptedExecutor::new(), |b| b).await
    }

    /// Executor calls block until released through `gate()`.
    pub async fn gated(config: RunnerConfig) -> Self {
        Self::with(config, InMemoryTaskStore::new(), ScriptedExecutor::gated(), |b| b).await
    }

    /// Start from an existing store, e.g. to simulate a restart.
    pub async fn with_store(config: RunnerConfig, store: InMemoryTaskStore) -> Self {
        Self::with(config, store, ScriptedExecutor::new(), |b| b).await
    }

    /// Full control: `configure` can add event sinks and the like.
    pub async fn with(
        config: RunnerConfig,
        store: InMemoryTaskStore,
        executor: ScriptedExecutor,
        configure: impl FnOnce(RunnerBuilder) -> RunnerBuilder,
    ) -> Self {
        let clock = FixedClock::new(ts(0));
        let reporter = RecordingReporter::new();
        let builder = RunnerBuilder::new()
            .config(config)
            .store(store.clone())
            .executor(executor.clone())
            .reporter(reporter.clone())
            .clock(clock.clone());
        let runner = configure(builder)
            .build()
            .await
            .expect("test runner should build");

        Self {
            runner: Arc::new(runner),
            store,
            executor,
            reporter,
            clock,
        }
    }

    pub fn gate(&self) -> ExecutorGate {
        self.executor.gate()
    }
}
