use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

/// An external command with an optional working directory and an
/// optional tool environment (virtualenv) to activate first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub venv: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            venv: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn with_venv(mut self, venv: impl AsRef<Path>) -> Self {
        self.venv = Some(venv.as_ref().to_path_buf());
        self
    }
}

/// Captured outcome of a command. The runner reports the exit status
/// without interpreting it; pass/fail branching is the caller's job.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> AppResult<CommandOutput>;
}

/// Runs commands through `sh -c` with a bounded timeout.
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> AppResult<CommandOutput> {
        let script = match &spec.venv {
            Some(venv) => format!(". {}/bin/activate && {}", venv.display(), spec.command),
            None => spec.command.clone(),
        };

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out command must not keep running
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        tracing::debug!(command = %spec.command, cwd = ?spec.cwd, "Running command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => {
                result.map_err(|e| AppError::Internal(format!("Failed to spawn command: {}", e)))?
            }
            Err(_) => {
                tracing::warn!(command = %spec.command, timeout = ?self.timeout, "Command timed out");
                return Ok(CommandOutput {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {:?}", self.timeout),
                    timed_out: true,
                });
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        })
    }
}

/// In-memory runner for unit testing: records every command and
/// reports failure for commands matching a configured substring.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    inner: Arc<Mutex<RecordingRunnerInner>>,
}

#[derive(Default)]
struct RecordingRunnerInner {
    recorded: Vec<CommandSpec>,
    fail_matching: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make commands containing the given substring report failure.
    pub async fn fail_matching(&self, pattern: impl Into<String>) {
        self.inner.lock().await.fail_matching = Some(pattern.into());
    }

    pub async fn recorded(&self) -> Vec<CommandSpec> {
        self.inner.lock().await.recorded.clone()
    }

    pub async fn recorded_commands(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .recorded
            .iter()
            .map(|s| s.command.clone())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> AppResult<CommandOutput> {
        let mut inner = self.inner.lock().await;
        inner.recorded.push(spec.clone());

        let success = match &inner.fail_matching {
            Some(pattern) => !spec.command.contains(pattern.as_str()),
            None => true,
        };

        Ok(CommandOutput {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_runner_captures_exit_status() {
        let runner = ShellRunner::new(Duration::from_secs(5));

        let ok = runner.run(&CommandSpec::new("true")).await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.exit_code, Some(0));

        let failed = runner.run(&CommandSpec::new("false")).await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_shell_runner_captures_stdout() {
        let runner = ShellRunner::new(Duration::from_secs(5));

        let out = runner.run(&CommandSpec::new("echo hello")).await.unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_shell_runner_times_out() {
        let runner = ShellRunner::new(Duration::from_millis(100));

        let out = runner.run(&CommandSpec::new("sleep 5")).await.unwrap();
        assert!(!out.success);
        assert!(out.timed_out);
    }

    #[tokio::test]
    async fn test_shell_runner_working_directory() {
        let runner = ShellRunner::new(Duration::from_secs(5));

        let out = runner
            .run(&CommandSpec::new("pwd").in_dir("/tmp"))
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.stdout.trim().ends_with("tmp"));
    }

    #[tokio::test]
    async fn test_recording_runner() {
        let runner = RecordingRunner::new();
        runner.fail_matching("pg_restore").await;

        let ok = runner.run(&CommandSpec::new("git clone x")).await.unwrap();
        assert!(ok.success);

        let failed = runner
            .run(&CommandSpec::new("pg_restore -d foo dump"))
            .await
            .unwrap();
        assert!(!failed.success);

        let recorded = runner.recorded_commands().await;
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].starts_with("git clone"));
    }
}
