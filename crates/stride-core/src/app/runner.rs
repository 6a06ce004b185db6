//! TaskRunner - the scheduler context.
//!
//! One instance owns the cached store document, the collaborators and the
//! tick timer. Several runners can live in one process as long as they use
//! different stores.
//!
//! # Tick
//! 1. Skip if a previous tick is still running.
//! 2. Promote pending tasks (FIFO) into the free `max_concurrent_tasks` slots.
//! 3. Advance every in-progress task by one step, sequentially. An error in
//!    one task is logged and does not stop the others.
//!
//! # Advancing one task
//! 1. Mark the current step in progress and persist.
//! 2. Call the executor without holding the cache lock.
//! 3. Re-read the task. If it was paused, cancelled or removed meanwhile the
//!    result is discarded.
//! 4. Apply success / retry / failure and persist, then notify.

use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::config::RunnerConfig;
use crate::domain::{
    RetryDecision, Step, StepStatus, StoreError, Task, TaskError, TaskEvent, TaskId, TaskStatus,
    build_step_prompt, final_result, final_summary, should_report_progress, truncate_chars,
};
use crate::ports::{
    Clock, EventSink, ExecutorError, IdGenerator, Reporter, StepExecutionRequest, StepExecutor,
    TaskStore,
};
use crate::store::StoreFile;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A previous tick was still running, so this one did nothing.
    pub skipped: bool,
    pub promoted: usize,
    /// In-progress tasks whose advancement returned normally.
    pub advanced: usize,
    /// Advancements that returned an error (logged, other tasks unaffected).
    pub failed: usize,
}

/// What `advance_task` did to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAdvance {
    /// The task is not in progress.
    Skipped,
    /// Retry backoff or step interval has not elapsed yet.
    Waiting,
    /// The step completed and more steps remain.
    Completed { step_index: usize },
    /// The attempt failed and the step went back to pending.
    Retrying { step_index: usize, attempt: u32 },
    /// The step exhausted its retries and the task failed.
    Failed { step_index: usize },
    /// The last step completed.
    TaskCompleted,
    /// The task was paused, cancelled or removed while the step ran.
    Discarded,
}

pub(super) struct Ticker {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

pub struct TaskRunner {
    pub(super) config: RunnerConfig,
    pub(super) store: Arc<dyn TaskStore>,
    pub(super) executor: Arc<dyn StepExecutor>,
    pub(super) reporter: Arc<dyn Reporter>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn IdGenerator>,
    pub(super) sinks: Vec<Arc<dyn EventSink>>,

    /// In-memory copy of the store document. Saved after every mutation.
    pub(super) cache: Mutex<StoreFile>,

    /// Held for the whole tick body; `try_lock` is the reentrancy guard.
    pub(super) tick_gate: Mutex<()>,

    pub(super) ticker: std::sync::Mutex<Option<Ticker>>,
}

impl TaskRunner {
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Is the interval timer armed?
    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Arm the interval timer. The first tick fires one interval from now.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() {
            warn!("task runner already started");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(tick_loop(
            Arc::downgrade(self),
            self.config.tick_interval(),
            shutdown_rx,
        ));
        *ticker = Some(Ticker { shutdown_tx, join });

        info!(tick_interval_ms = self.config.tick_interval_ms, "task runner started");
    }

    /// Disarm the timer, wait for an in-flight tick and flush the cache.
    pub async fn stop(&self) -> Result<(), StoreError> {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Ticker { shutdown_tx, join }) = ticker {
            // ignore send error: the loop may already be gone
            let _ = shutdown_tx.send(true);
            if let Err(err) = join.await {
                warn!(error = %err, "tick loop ended abnormally");
            }
        }

        // A manual tick may still be running.
        let _gate = self.tick_gate.lock().await;
        let cache = self.cache.lock().await;
        self.store.save(&cache).await?;
        info!(tasks = cache.tasks.len(), "task runner stopped");
        Ok(())
    }

    /// Run one tick. A tick that starts while another is running is a no-op.
    #[instrument(skip(self))]
    pub async fn advance_all_tasks(&self) -> TickReport {
        let Ok(_gate) = self.tick_gate.try_lock() else {
            debug!("previous tick still running, skipping");
            return TickReport {
                skipped: true,
                ..TickReport::default()
            };
        };

        let mut report = TickReport {
            promoted: self.promote_pending().await,
            ..TickReport::default()
        };

        let in_progress = self.cache.lock().await.ids_with_status(TaskStatus::InProgress);
        for id in in_progress {
            match self.advance_one(id).await {
                Ok(advance) => {
                    report.advanced += 1;
                    debug!(task_id = %id, ?advance, "task advanced");
                }
                Err(err) => {
                    report.failed += 1;
                    error!(task_id = %id, error = %err, "failed to advance task");
                }
            }
        }

        if report != TickReport::default() {
            info!(
                promoted = report.promoted,
                advanced = report.advanced,
                failed = report.failed,
                "tick finished"
            );
        }
        report
    }

    /// Advance one task by at most one step, outside of a tick.
    ///
    /// Waits for a running tick to finish first, so a step is never executed
    /// twice at the same time.
    pub async fn advance_task(&self, id: TaskId) -> Result<StepAdvance, TaskError> {
        let _gate = self.tick_gate.lock().await;
        self.advance_one(id).await
    }

    async fn promote_pending(&self) -> usize {
        let mut cache = self.cache.lock().await;
        let running = cache.count_with_status(TaskStatus::InProgress);
        let slots = self.config.max_concurrent_tasks.saturating_sub(running);
        if slots == 0 {
            return 0;
        }

        let promoted: Vec<TaskId> = cache
            .ids_with_status(TaskStatus::Pending)
            .into_iter()
            .take(slots)
            .collect();
        if promoted.is_empty() {
            return 0;
        }

        let now = self.clock.now();
        for id in &promoted {
            if let Some(task) = cache.find_task_mut(*id) {
                task.promote(now);
                info!(task_id = %id, "task promoted");
            }
        }
        // logged inside; the promotion stays in the cache for the next save
        let _ = self.persist(&cache).await;
        promoted.len()
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn advance_one(&self, id: TaskId) -> Result<StepAdvance, TaskError> {
        let now = self.clock.now();
        let mut cache = self.cache.lock().await;
        let task = cache.find_task_mut(id).ok_or(TaskError::NotFound(id))?;
        if task.status != TaskStatus::InProgress {
            return Ok(StepAdvance::Skipped);
        }

        let step_index = task.current_step_index;
        let Some(step) = task.steps.get(step_index) else {
            warn!(step_index, "no step left to run, completing task");
            return self.complete_task(cache, id, now).await;
        };
        if !step.is_due(now) || !task.is_step_interval_elapsed(now) {
            return Ok(StepAdvance::Waiting);
        }

        let step_id = step.id;
        let attempt = step.retry_count + 1;
        if step.status == StepStatus::InProgress {
            warn!(step_index, "re-executing interrupted step");
        }

        let message = build_step_prompt(task, step_index, &self.config.text_limits());
        let step_timeout = Duration::from_millis(task.timeout_per_step_ms);
        let request = StepExecutionRequest::new(message, task.session_key.clone(), step_timeout);

        if let Some(step) = task.current_step_mut() {
            step.start(now);
        }
        task.updated_at = now;
        // on disk before the executor runs: a crash leaves the step in_progress
        self.persist(&cache).await?;
        drop(cache);

        info!(step_index, attempt, "executing step");
        let deadline = step_timeout + self.config.executor_grace();
        let outcome = match tokio::time::timeout(deadline, self.executor.execute(request)).await {
            Ok(Ok(outcome)) => outcome.into_result(),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(ExecutorError::Timeout(deadline).to_string()),
        };

        let now = self.clock.now();
        let cache = self.cache.lock().await;
        let Some(task) = cache.find_task(id) else {
            warn!(step_index, "task removed while its step was running, discarding result");
            return Ok(StepAdvance::Discarded);
        };
        let still_current = task.status == TaskStatus::InProgress
            && task.current_step_index == step_index
            && task
                .current_step()
                .is_some_and(|step| step.id == step_id && step.status == StepStatus::InProgress);
        if !still_current {
            info!(step_index, status = %task.status, "task changed while its step was running, discarding result");
            return Ok(StepAdvance::Discarded);
        }

        match outcome {
            Ok(summary) => self.on_step_success(cache, id, step_index, summary, now).await,
            Err(error) => self.on_step_failure(cache, id, step_index, error, now).await,
        }
    }

    async fn on_step_success(
        &self,
        mut cache: MutexGuard<'_, StoreFile>,
        id: TaskId,
        step_index: usize,
        summary: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StepAdvance, TaskError> {
        let result = summary
            .map(|summary| truncate_chars(summary.trim(), self.config.max_result_chars))
            .filter(|summary| !summary.is_empty());

        let task = cache.find_task_mut(id).ok_or(TaskError::NotFound(id))?;
        task.complete_current_step(result, now);
        let completed_step = task.steps.get(step_index).cloned();
        let report_due = should_report_progress(task);
        let finished = !task.has_remaining_steps();
        if finished {
            let limits = self.config.text_limits();
            let summary = final_summary(task, &limits);
            let result = final_result(task);
            task.finish(summary, result, now);
        }
        let mut snapshot = task.clone();
        self.persist(&cache).await?;
        drop(cache);

        info!(
            step_index,
            completed = snapshot.completed_steps(),
            total = snapshot.total_steps(),
            "step completed"
        );

        if report_due && let Some(step) = completed_step {
            self.report_progress(&mut snapshot, &step).await;
        }

        if finished {
            self.notify_completed(snapshot).await;
            return Ok(StepAdvance::TaskCompleted);
        }
        Ok(StepAdvance::Completed { step_index })
    }

    async fn on_step_failure(
        &self,
        mut cache: MutexGuard<'_, StoreFile>,
        id: TaskId,
        step_index: usize,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<StepAdvance, TaskError> {
        let task = cache.find_task_mut(id).ok_or(TaskError::NotFound(id))?;
        let max_retries = task.max_retries;
        let Some(step) = task.current_step_mut() else {
            return Ok(StepAdvance::Discarded);
        };

        match self.config.retry_policy().decide(step.retry_count, max_retries) {
            RetryDecision::Retry { attempt, delay } => {
                let next_attempt_at = chrono::Duration::from_std(delay)
                    .ok()
                    .filter(|delay| !delay.is_zero())
                    .and_then(|delay| now.checked_add_signed(delay));
                step.schedule_retry(error.clone(), next_attempt_at);
                task.updated_at = now;
                self.persist(&cache).await?;

                warn!(
                    step_index,
                    attempt,
                    max_retries,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %error,
                    "step failed, will retry"
                );
                Ok(StepAdvance::Retrying {
                    step_index,
                    attempt,
                })
            }
            RetryDecision::Exhausted => {
                step.fail(error.clone(), now);
                let summary = final_summary(task, &self.config.text_limits());
                task.fail(summary, now);
                let snapshot = task.clone();
                self.persist(&cache).await?;
                drop(cache);

                error!(step_index, max_retries, error = %error, "step exhausted its retries, task failed");
                if let Err(err) = self.reporter.report_failure(&snapshot, &error).await {
                    warn!(error = %err, "failure report failed");
                }
                self.emit(TaskEvent::Failed {
                    task: snapshot,
                    error,
                });
                Ok(StepAdvance::Failed { step_index })
            }
        }
    }

    /// Completion of a task whose index already ran past the last step.
    async fn complete_task(
        &self,
        mut cache: MutexGuard<'_, StoreFile>,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<StepAdvance, TaskError> {
        let task = cache.find_task_mut(id).ok_or(TaskError::NotFound(id))?;
        let limits = self.config.text_limits();
        let summary = final_summary(task, &limits);
        let result = final_result(task);
        task.finish(summary, result, now);
        let snapshot = task.clone();
        self.persist(&cache).await?;
        drop(cache);

        self.notify_completed(snapshot).await;
        Ok(StepAdvance::TaskCompleted)
    }

    async fn report_progress(&self, task: &mut Task, step: &Step) {
        match self.reporter.report_progress(task, step).await {
            Ok(Some(report)) => {
                task.progress_reports.push(report.clone());
                let mut cache = self.cache.lock().await;
                match cache.update_task(task.id, |stored| stored.progress_reports.push(report)) {
                    Ok(_) => {
                        let _ = self.persist(&cache).await;
                    }
                    Err(err) => warn!(task_id = %task.id, error = %err, "could not record progress report"),
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(task_id = %task.id, step_index = step.index, error = %err, "progress report failed");
            }
        }
    }

    async fn notify_completed(&self, task: Task) {
        info!(task_id = %task.id, steps = task.total_steps(), "task completed");
        if let Err(err) = self.reporter.report_completion(&task).await {
            warn!(task_id = %task.id, error = %err, "completion report failed");
        }
        self.emit(TaskEvent::Completed { task });
    }

    /// Fan an event out to every sink, each on its own task.
    pub(super) fn emit(&self, event: TaskEvent) {
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(err) = sink.emit(&event).await {
                    warn!(
                        task_id = %event.task().id,
                        event = event.kind(),
                        error = %err,
                        "event sink failed"
                    );
                }
            });
        }
    }

    pub(super) async fn persist(&self, cache: &StoreFile) -> Result<(), StoreError> {
        self.store
            .save(cache)
            .await
            .inspect_err(|err| error!(error = %err, "failed to persist task store"))
    }
}

async fn tick_loop(
    runner: Weak<TaskRunner>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // also fires when the sender is dropped
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {}
        }
        let Some(runner) = runner.upgrade() else {
            break;
        };
        runner.advance_all_tasks().await;
    }
    debug!("tick loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StepOutcome, TaskSpec};
    use crate::test_support::{Recorded, TestRig, sample_spec};

    #[tokio::test]
    async fn overlapping_tick_is_a_noop() {
        let rig = TestRig::gated(RunnerConfig::default()).await;
        let gate = rig.gate();
        rig.runner.create_task(sample_spec(1)).await.unwrap();

        let runner = Arc::clone(&rig.runner);
        let first = tokio::spawn(async move { runner.advance_all_tasks().await });
        gate.wait_started().await;

        let second = rig.runner.advance_all_tasks().await;
        assert!(second.skipped);
        assert_eq!(rig.executor.calls(), 1);

        gate.release();
        let first = first.await.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.promoted, 1);
        assert_eq!(first.advanced, 1);
    }

    #[tokio::test]
    async fn result_of_step_cancelled_mid_flight_is_discarded() {
        let rig = TestRig::gated(RunnerConfig::default()).await;
        let gate = rig.gate();
        let task = rig.runner.create_task(sample_spec(2)).await.unwrap();

        let runner = Arc::clone(&rig.runner);
        let tick = tokio::spawn(async move { runner.advance_all_tasks().await });
        gate.wait_started().await;

        rig.runner.cancel_task(task.id).await.unwrap();
        gate.release();
        tick.await.unwrap();

        let task = rig.runner.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.steps[0].status, StepStatus::Cancelled);
        assert_eq!(task.steps[0].result, None);
        assert_eq!(task.current_step_index, 0);
        assert!(rig.reporter.recorded().is_empty());
    }

    #[tokio::test]
    async fn paused_mid_flight_step_is_rerun_after_resume() {
        let rig = TestRig::gated(RunnerConfig::default()).await;
        let gate = rig.gate();
        let task = rig.runner.create_task(sample_spec(1)).await.unwrap();

        let runner = Arc::clone(&rig.runner);
        let tick = tokio::spawn(async move { runner.advance_all_tasks().await });
        gate.wait_started().await;
        rig.runner.pause_task(task.id).await.unwrap();
        gate.release();
        tick.await.unwrap();

        let paused = rig.runner.get_task(task.id).await.unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);
        assert_eq!(paused.steps[0].status, StepStatus::InProgress);

        rig.executor.ungate();
        rig.runner.resume_task(task.id).await.unwrap();
        rig.runner.advance_all_tasks().await;

        let done = rig.runner.get_task(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(rig.executor.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn executor_that_overruns_its_deadline_is_a_transient_failure() {
        let config = RunnerConfig {
            executor_grace_ms: 0,
            ..RunnerConfig::default()
        };
        let rig = TestRig::new(config).await;
        rig.executor.push_hang();
        let task = rig
            .runner
            .create_task(sample_spec(1).timeout_per_step_ms(1_000))
            .await
            .unwrap();

        rig.runner.advance_all_tasks().await;

        let task = rig.runner.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.steps[0].status, StepStatus::Pending);
        assert_eq!(task.steps[0].retry_count, 1);
        assert!(task.steps[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn retry_backoff_delays_the_next_attempt() {
        let mut config = RunnerConfig::default();
        config.retry.base_delay_ms = 60_000;
        let rig = TestRig::new(config).await;
        rig.executor.push_error("flaky");
        let task = rig.runner.create_task(sample_spec(1)).await.unwrap();

        rig.runner.advance_all_tasks().await;
        let waiting = rig.runner.advance_task(task.id).await.unwrap();
        assert_eq!(waiting, StepAdvance::Waiting);
        assert_eq!(rig.executor.calls(), 1);

        rig.clock.advance(chrono::Duration::seconds(60));
        let done = rig.runner.advance_task(task.id).await.unwrap();
        assert_eq!(done, StepAdvance::TaskCompleted);
    }

    #[tokio::test]
    async fn step_interval_spaces_out_steps() {
        let rig = TestRig::new(RunnerConfig::default()).await;
        let task = rig
            .runner
            .create_task(sample_spec(2).step_interval_ms(10_000))
            .await
            .unwrap();

        rig.runner.advance_all_tasks().await;
        assert_eq!(
            rig.runner.advance_task(task.id).await.unwrap(),
            StepAdvance::Waiting
        );

        rig.clock.advance(chrono::Duration::seconds(10));
        assert_eq!(
            rig.runner.advance_task(task.id).await.unwrap(),
            StepAdvance::TaskCompleted
        );
    }

    #[tokio::test]
    async fn persistence_failure_in_one_tick_is_isolated_and_logged() {
        let rig = TestRig::new(RunnerConfig::default()).await;
        rig.runner.create_task(sample_spec(1)).await.unwrap();
        rig.runner.create_task(sample_spec(1)).await.unwrap();
        rig.store.fail_saves(true);

        let report = rig.runner.advance_all_tasks().await;

        assert_eq!(report.promoted, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(rig.executor.calls(), 0);

        rig.store.fail_saves(false);
        let report = rig.runner.advance_all_tasks().await;
        assert_eq!(report.advanced, 2);
        assert_eq!(rig.runner.counts().await.completed, 2);
    }

    #[tokio::test]
    async fn reporter_failures_never_roll_back_transitions() {
        let rig = TestRig::new(RunnerConfig::default()).await;
        rig.reporter.fail_reports(true);
        let task = rig.runner.create_task(sample_spec(1)).await.unwrap();

        rig.runner.advance_all_tasks().await;

        let task = rig.runner.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.progress_reports.is_empty());
    }

    #[tokio::test]
    async fn long_results_are_truncated() {
        let config = RunnerConfig {
            max_result_chars: 10,
            ..RunnerConfig::default()
        };
        let rig = TestRig::new(config).await;
        rig.executor.push(StepOutcome::ok("x".repeat(100)));
        let task = rig.runner.create_task(sample_spec(1)).await.unwrap();

        rig.runner.advance_all_tasks().await;

        let task = rig.runner.get_task(task.id).await.unwrap();
        assert_eq!(task.steps[0].result.as_deref().unwrap().chars().count(), 10);
    }

    #[tokio::test]
    async fn executor_receives_session_key_and_step_timeout() {
        let rig = TestRig::new(RunnerConfig::default()).await;
        let task = rig
            .runner
            .create_task(TaskSpec::new("ship").step("build", "cargo build").timeout_per_step_ms(90_000))
            .await
            .unwrap();

        rig.runner.advance_all_tasks().await;

        let requests = rig.executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].session_key, task.session_key);
        assert_eq!(requests[0].timeout_seconds, 90);
        assert!(!requests[0].deliver);
        assert!(requests[0].message.contains("Step 1 of 1: build"));
        assert_eq!(
            rig.reporter.recorded().last(),
            Some(&Recorded::Completion { task_id: task.id })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn started_runner_ticks_until_stopped() {
        let config = RunnerConfig {
            tick_interval_ms: 1_000,
            ..RunnerConfig::default()
        };
        let rig = TestRig::new(config).await;
        let task = rig.runner.create_task(sample_spec(2)).await.unwrap();

        rig.runner.start();
        assert!(rig.runner.is_running());
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        rig.runner.stop().await.unwrap();
        assert!(!rig.runner.is_running());

        let stored = rig.store.snapshot().await;
        let task = stored.find_task(task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}
