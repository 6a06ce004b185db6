//! Step executor backed by an external agent command.
//!
//! The prompt is written to the child's stdin. The child sees
//! `STRIDE_SESSION_KEY` and `STRIDE_TIMEOUT_SECONDS` in its environment.
//!
//! Interpretation of the result:
//! - exit 0, stdout is a JSON outcome (`{"status": ...}`): taken as is
//! - exit 0, anything else: `ok` with the trimmed stdout as summary
//! - non-zero exit: `error` with stderr (or stdout when stderr is empty)

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;
use tracing::debug;

use crate::domain::StepOutcome;
use crate::ports::{ExecutorError, StepExecutionRequest, StepExecutor};

pub const SESSION_KEY_ENV: &str = "STRIDE_SESSION_KEY";
pub const TIMEOUT_SECONDS_ENV: &str = "STRIDE_TIMEOUT_SECONDS";

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl StepExecutor for CommandExecutor {
    async fn execute(&self, request: StepExecutionRequest) -> Result<StepOutcome, ExecutorError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .env(SESSION_KEY_ENV, &request.session_key)
            .env(TIMEOUT_SECONDS_ENV, request.timeout_seconds.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.program, session_key = %request.session_key, "spawning step command");
        let mut child = command.spawn().map_err(ExecutorError::Spawn)?;

        // Feed stdin concurrently so a child that writes before reading
        // cannot deadlock against us.
        let writer = child.stdin.take().map(|mut stdin| {
            let message = request.message.clone();
            tokio::spawn(async move {
                stdin.write_all(message.as_bytes()).await?;
                stdin.shutdown().await
            })
        });

        let timeout = request.timeout();
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutorError::Timeout(timeout))?
            .map_err(ExecutorError::Io)?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // the child exited without reading everything
                Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {
                    debug!("step command closed stdin early");
                }
                Ok(Err(err)) => return Err(ExecutorError::Io(err)),
                Err(err) => return Err(ExecutorError::Failed(err.to_string())),
            }
        }

        Ok(interpret(&output))
    }
}

fn interpret(output: &Output) -> StepOutcome {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();

    if output.status.success() {
        if let Ok(outcome) = serde_json::from_str::<StepOutcome>(stdout) {
            return outcome;
        }
        if stdout.is_empty() {
            return StepOutcome::empty();
        }
        return StepOutcome::ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = Some(stderr.trim())
        .filter(|stderr| !stderr.is_empty())
        .unwrap_or(stdout);
    let status = output
        .status
        .code()
        .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
    if detail.is_empty() {
        StepOutcome::error(format!("command exited with {status}"))
    } else {
        StepOutcome::error(format!("command exited with {status}: {detail}"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::OutcomeStatus;
    use std::time::Duration;

    fn request(message: &str, timeout_secs: u64) -> StepExecutionRequest {
        StepExecutionRequest::new(
            message.to_string(),
            "stride:test".to_string(),
            Duration::from_secs(timeout_secs),
        )
    }

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn prompt_arrives_on_stdin_and_stdout_is_the_summary() {
        let outcome = sh("cat").execute(request("  hello step  \n", 5)).await.unwrap();
        assert_eq!(outcome, StepOutcome::ok("hello step"));
    }

    #[tokio::test]
    async fn session_key_and_timeout_are_exported() {
        let outcome = sh("printf '%s %s' \"$STRIDE_SESSION_KEY\" \"$STRIDE_TIMEOUT_SECONDS\"")
            .execute(request("", 7))
            .await
            .unwrap();
        assert_eq!(outcome.summary.as_deref(), Some("stride:test 7"));
    }

    #[tokio::test]
    async fn json_outcome_is_taken_verbatim() {
        let outcome = sh(r#"echo '{"status":"error","error":"quota exceeded"}'"#)
            .execute(request("go", 5))
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.error.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let outcome = sh("echo broken >&2; exit 3")
            .execute(request("go", 5))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::error("command exited with status 3: broken"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = sh("sleep 5").execute(request("go", 1)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout(timeout) if timeout == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = CommandExecutor::new("/nonexistent/stride-agent")
            .execute(request("go", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn(_)));
    }
}
