//! App - the scheduler and its management surface.
//!
//! # Components
//! - **RunnerConfig**: knobs and per-task defaults
//! - **RunnerBuilder**: wiring and fail-fast validation
//! - **TaskRunner**: tick / advance / start / stop
//! - **manage**: create / cancel / pause / resume / remove / query
//! - **TaskCounts**: status counts

pub mod builder;
pub mod config;
pub mod manage;
pub mod runner;
pub mod status;

pub use self::builder::{BuildError, RunnerBuilder};
pub use self::config::{ConfigError, RetryConfig, RunnerConfig};
pub use self::manage::TaskFilter;
pub use self::runner::{StepAdvance, TaskRunner, TickReport};
pub use self::status::TaskCounts;
