//! Task creation input and defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::step::Step;
use super::task::{Task, TaskStatus};
use crate::ports::IdGenerator;

/// Smallest accepted per-step timeout.
pub const MIN_STEP_TIMEOUT_MS: u64 = 1_000;

/// Caller-supplied description of a task to create.
///
/// Every scheduling and reporting knob is optional; missing values come from
/// [`TaskDefaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_every_steps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_per_step_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub description: String,
    pub prompt: String,
}

impl StepSpec {
    pub fn new(description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            prompt: prompt.into(),
        }
    }
}

/// Values applied to knobs a [`TaskSpec`] leaves unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefaults {
    pub max_steps: usize,
    pub max_retries: u32,
    pub step_interval_ms: u64,
    pub timeout_per_step_ms: u64,
    pub report_every_steps: u32,
    pub report_channel: String,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_retries: 3,
            step_interval_ms: 0,
            timeout_per_step_ms: 600_000,
            report_every_steps: 1,
            report_channel: "log".to_string(),
        }
    }
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            report_channel: None,
            report_to: None,
            report_topic_id: None,
            report_every_steps: None,
            step_interval_ms: None,
            max_retries: None,
            timeout_per_step_ms: None,
            metadata: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn step(mut self, description: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.steps.push(StepSpec::new(description, prompt));
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn report_every_steps(mut self, every: u32) -> Self {
        self.report_every_steps = Some(every);
        self
    }

    pub fn step_interval_ms(mut self, interval_ms: u64) -> Self {
        self.step_interval_ms = Some(interval_ms);
        self
    }

    pub fn timeout_per_step_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_per_step_ms = Some(timeout_ms);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check the spec without touching any state.
    pub fn validate(&self, max_steps: usize) -> Result<(), TaskError> {
        if self.steps.is_empty() {
            return Err(TaskError::NoSteps);
        }
        if self.steps.len() > max_steps {
            return Err(TaskError::TooManySteps {
                count: self.steps.len(),
                max: max_steps,
            });
        }
        if self.name.trim().is_empty() {
            return Err(TaskError::invalid("name", "must not be empty"));
        }
        if let Some(position) = self.steps.iter().position(|step| step.prompt.trim().is_empty()) {
            return Err(TaskError::invalid(
                "steps",
                format!("step {} has an empty prompt", position + 1),
            ));
        }
        if self.report_every_steps == Some(0) {
            return Err(TaskError::invalid("reportEverySteps", "must be at least 1"));
        }
        if let Some(timeout_ms) = self.timeout_per_step_ms
            && timeout_ms < MIN_STEP_TIMEOUT_MS
        {
            return Err(TaskError::invalid(
                "timeoutPerStepMs",
                format!("must be at least {MIN_STEP_TIMEOUT_MS}"),
            ));
        }
        Ok(())
    }

    /// Validate and materialize a new pending task.
    pub fn into_task(
        self,
        ids: &dyn IdGenerator,
        defaults: &TaskDefaults,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        self.validate(defaults.max_steps)?;

        let id = ids.generate_task_id();
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let description = if spec.description.trim().is_empty() {
                    format!("Step {}", index + 1)
                } else {
                    spec.description
                };
                Step::new(ids.generate_step_id(), index, description, spec.prompt)
            })
            .collect();

        Ok(Task {
            id,
            name: self.name,
            description: self.description,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            steps,
            current_step_index: 0,
            session_key: format!("stride:{}", id.as_ulid()),
            step_interval_ms: self.step_interval_ms.unwrap_or(defaults.step_interval_ms),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            timeout_per_step_ms: self
                .timeout_per_step_ms
                .unwrap_or(defaults.timeout_per_step_ms),
            report_channel: self
                .report_channel
                .filter(|channel| !channel.trim().is_empty())
                .unwrap_or_else(|| defaults.report_channel.clone()),
            report_to: self.report_to,
            report_topic_id: self.report_topic_id,
            report_every_steps: self
                .report_every_steps
                .unwrap_or(defaults.report_every_steps),
            progress_reports: Vec::new(),
            final_summary: None,
            final_result: None,
            metadata: self.metadata,
        })
    }
}
