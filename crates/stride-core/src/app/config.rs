//! Runner configuration.
//!
//! Every field has a default, so a partial TOML table (or none at all) is a
//! valid configuration. `validate()` runs once in `RunnerBuilder::build`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{MIN_STEP_TIMEOUT_MS, RetryPolicy, TaskDefaults, TextLimits};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid runner config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Ceiling on tasks holding `in_progress` at once.
    pub max_concurrent_tasks: usize,
    pub max_steps_per_task: usize,
    pub tick_interval_ms: u64,

    pub default_max_retries: u32,
    pub default_timeout_per_step_ms: u64,
    pub default_report_every_steps: u32,
    pub default_report_channel: String,
    pub default_step_interval_ms: u64,

    /// Truncation of the stored `step.result`.
    pub max_result_chars: usize,
    pub context_chars_per_step: usize,
    pub max_context_chars: usize,
    pub summary_chars_per_step: usize,

    /// Slack added to `timeoutPerStepMs` before the scheduler gives up on the
    /// executor call.
    pub executor_grace_ms: u64,

    pub retry: RetryConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            max_steps_per_task: 50,
            tick_interval_ms: 30_000,
            default_max_retries: 3,
            default_timeout_per_step_ms: 600_000,
            default_report_every_steps: 1,
            default_report_channel: "log".to_string(),
            default_step_interval_ms: 0,
            max_result_chars: 4_000,
            context_chars_per_step: 1_000,
            max_context_chars: 8_000,
            summary_chars_per_step: 500,
            executor_grace_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff between attempts of a failing step. `base_delay_ms = 0` retries
/// on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 0,
            multiplier: 2.0,
            max_delay_ms: 300_000,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
            Ok(())
        }

        positive("max_concurrent_tasks", self.max_concurrent_tasks as u64)?;
        positive("max_steps_per_task", self.max_steps_per_task as u64)?;
        positive("tick_interval_ms", self.tick_interval_ms)?;
        positive("default_report_every_steps", self.default_report_every_steps.into())?;
        positive("max_result_chars", self.max_result_chars as u64)?;
        positive("summary_chars_per_step", self.summary_chars_per_step as u64)?;

        if self.default_timeout_per_step_ms < MIN_STEP_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_per_step_ms must be at least {MIN_STEP_TIMEOUT_MS}"
            )));
        }
        if self.default_report_channel.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_report_channel must not be empty".to_string(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn executor_grace(&self) -> Duration {
        Duration::from_millis(self.executor_grace_ms)
    }

    pub fn task_defaults(&self) -> TaskDefaults {
        TaskDefaults {
            max_steps: self.max_steps_per_task,
            max_retries: self.default_max_retries,
            step_interval_ms: self.default_step_interval_ms,
            timeout_per_step_ms: self.default_timeout_per_step_ms,
            report_every_steps: self.default_report_every_steps,
            report_channel: self.default_report_channel.clone(),
        }
    }

    pub fn text_limits(&self) -> TextLimits {
        TextLimits {
            context_chars_per_step: self.context_chars_per_step,
            max_context_chars: self.max_context_chars,
            summary_chars_per_step: self.summary_chars_per_step,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry.base_delay_ms == 0 {
            return RetryPolicy::immediate();
        }
        RetryPolicy::exponential(
            Duration::from_millis(self.retry.base_delay_ms),
            self.retry.multiplier,
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = RunnerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.task_defaults(), TaskDefaults::default());
        assert_eq!(config.text_limits(), TextLimits::default());
        assert_eq!(config.retry_policy(), RetryPolicy::immediate());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RunnerConfig = toml::from_str(
            r#"
            max_concurrent_tasks = 1

            [retry]
            base_delay_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_tasks, 1);
        assert_eq!(config.max_steps_per_task, 50);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(500));
    }

    #[rstest]
    #[case::no_slots(RunnerConfig { max_concurrent_tasks: 0, ..RunnerConfig::default() })]
    #[case::no_steps(RunnerConfig { max_steps_per_task: 0, ..RunnerConfig::default() })]
    #[case::no_tick(RunnerConfig { tick_interval_ms: 0, ..RunnerConfig::default() })]
    #[case::never_report(RunnerConfig { default_report_every_steps: 0, ..RunnerConfig::default() })]
    #[case::short_timeout(RunnerConfig { default_timeout_per_step_ms: 10, ..RunnerConfig::default() })]
    #[case::blank_channel(RunnerConfig { default_report_channel: " ".to_string(), ..RunnerConfig::default() })]
    #[case::shrinking_backoff(RunnerConfig {
        retry: RetryConfig { multiplier: 0.5, ..RetryConfig::default() },
        ..RunnerConfig::default()
    })]
    fn rejects_invalid_values(#[case] config: RunnerConfig) {
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
