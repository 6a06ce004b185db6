//! stride-core
//!
//! Persistent multi-step task orchestration: a task is an ordered list of
//! steps, each executed by an external agent, advanced one step per tick
//! under a concurrency ceiling, retried with a bound and persisted after
//! every change.
//!
//! # Modules
//! - **domain**: tasks, steps, their state machines, prompt / summary synthesis
//! - **ports**: traits at the seams (TaskStore, StepExecutor, Reporter, EventSink, Clock, IdGenerator)
//! - **store**: the store document, JSON file store, in-memory store
//! - **app**: RunnerConfig, RunnerBuilder, TaskRunner and the management API
//! - **impls**: CommandExecutor, LogReporter, WorkflowFilter
//! - **test_support**: scripted doubles (tests / `test-support` feature)

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use app::{RunnerBuilder, RunnerConfig, StepAdvance, TaskFilter, TaskRunner, TickReport};
pub use domain::{Task, TaskError, TaskId, TaskSpec, TaskStatus};
