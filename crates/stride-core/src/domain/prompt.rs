//! Step prompt and final summary synthesis.
//!
//! Executor invocations are isolated from one another; context threads across
//! them only through the digest of prior completed results built here.

use std::fmt::Write as _;

use super::step::Step;
use super::task::Task;
use super::text::truncate_chars;

/// Size bounds for synthesized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    /// Per prior step in the prompt digest.
    pub context_chars_per_step: usize,
    /// Whole prompt digest.
    pub max_context_chars: usize,
    /// Per step in the final summary.
    pub summary_chars_per_step: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            context_chars_per_step: 1_000,
            max_context_chars: 8_000,
            summary_chars_per_step: 500,
        }
    }
}

/// Build the executor message for the step at `step_index`.
pub fn build_step_prompt(task: &Task, step_index: usize, limits: &TextLimits) -> String {
    let total = task.steps.len();
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Task: {}", task.name);
    if !task.description.trim().is_empty() {
        let _ = writeln!(prompt, "Description: {}", task.description.trim());
    }
    prompt.push('\n');

    let Some(step) = task.steps.get(step_index) else {
        return prompt;
    };
    let _ = writeln!(
        prompt,
        "Step {} of {}: {}",
        step_index + 1,
        total,
        step.description
    );

    let digest = context_digest(&task.steps[..step_index], limits);
    if !digest.is_empty() {
        prompt.push_str("\nContext from previous steps:\n");
        prompt.push_str(&digest);
    }

    prompt.push_str("\nInstructions:\n");
    prompt.push_str(step.prompt.trim());
    prompt.push('\n');
    prompt
}

fn context_digest(previous: &[Step], limits: &TextLimits) -> String {
    let mut digest = String::new();
    for step in previous.iter().filter(|step| step.is_completed()) {
        let result = step.result.as_deref().unwrap_or("").trim();
        let result = if result.is_empty() {
            "(no output)".to_string()
        } else {
            truncate_chars(result, limits.context_chars_per_step)
        };
        let _ = writeln!(
            digest,
            "- Step {} ({}): {}",
            step.index + 1,
            step.description,
            result
        );
    }
    truncate_chars(&digest, limits.max_context_chars)
}

/// Concatenate the truncated results of every completed step.
///
/// For a failed task the failing step's error is appended, so the summary
/// explains where the task stopped.
pub fn final_summary(task: &Task, limits: &TextLimits) -> String {
    let mut summary = String::new();
    for step in &task.steps {
        if step.is_completed() {
            let result = step.result.as_deref().unwrap_or("").trim();
            let _ = writeln!(
                summary,
                "Step {} ({}): {}",
                step.index + 1,
                step.description,
                if result.is_empty() {
                    "done".to_string()
                } else {
                    truncate_chars(result, limits.summary_chars_per_step)
                }
            );
        } else if let Some(error) = step.error.as_deref().filter(|_| !step.status.is_open()) {
            let _ = writeln!(
                summary,
                "Step {} ({}) {}: {}",
                step.index + 1,
                step.description,
                step.status,
                truncate_chars(error, limits.summary_chars_per_step)
            );
        }
    }
    summary.trim_end().to_string()
}

/// The last non-empty result among completed steps.
pub fn final_result(task: &Task) -> Option<String> {
    task.steps
        .iter()
        .rev()
        .filter(|step| step.is_completed())
        .filter_map(|step| step.result.as_deref())
        .find(|result| !result.trim().is_empty())
        .map(str::to_string)
}
