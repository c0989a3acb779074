//! One-shot shell command execution with bounded time.
//!
//! Demo steps are shell scripts that frequently begin with
//! `source venv/bin/activate && ...`, so every command runs under `bash -c`
//! rather than a plain exec. Timeouts and spawn failures are reported as
//! values on `StepOutput` (exit code -1), not as errors: a failed step is an
//! ordinary outcome of the workflow, and callers need the captured stderr
//! either way.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default time budget for a single workflow step.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for a killed child to be reaped before giving up.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Fixed stderr message reported when a step exceeds its time budget.
pub const TIMEOUT_MESSAGE: &str = "Command timed out";

/// A single external command to run: shell-interpreted command string,
/// environment overrides (merged on top of the ambient environment),
/// optional working directory, and a time budget.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
            cwd: None,
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge a map of overrides; later keys win over earlier ones.
    pub fn envs(mut self, vars: &HashMap<String, String>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of one external command.
///
/// Invariant: `success` is true iff `exit_code == 0`. Exit code -1 is
/// reserved for timeout and spawn/internal failure.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl StepOutput {
    pub fn from_exit(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: TIMEOUT_MESSAGE.to_string(),
            exit_code: -1,
        }
    }

    pub fn failed_to_start(message: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message,
            exit_code: -1,
        }
    }

    /// Deterministic stdout/stderr join used for both display and
    /// sequence-number extraction: stdout first, then a fixed separator and
    /// stderr, but only when stderr is non-empty.
    pub fn formatted_output(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();

        if stderr.is_empty() {
            return stdout.to_string();
        }
        if stdout.is_empty() {
            return stderr.to_string();
        }
        format!("{stdout}\n\n--- Debug/Trace Output ---\n{stderr}")
    }
}

/// Trait seam for command execution so the orchestrator and auth helpers can
/// be exercised against scripted outputs in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, request: CommandRequest) -> StepOutput;
}

/// Runs commands under `bash -c` against the project root.
///
/// Exactly one child process is spawned per call and is always fully reaped
/// before the call returns, including on timeout.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    project_root: PathBuf,
}

impl ShellRunner {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, request: CommandRequest) -> StepOutput {
        let cwd = request
            .cwd
            .clone()
            .unwrap_or_else(|| self.project_root.clone());

        debug!(
            command = %request.command,
            cwd = %cwd.display(),
            timeout_secs = request.timeout.as_secs(),
            "Running workflow command"
        );

        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(&request.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Backstop only: the timeout branch below kills and reaps
            // explicitly before returning.
            .kill_on_drop(true);
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.command, error = %e, "Failed to spawn workflow command");
                return StepOutput::failed_to_start(format!(
                    "Failed to start command: {e}"
                ));
            }
        };

        let (Some(mut stdout_pipe), Some(mut stderr_pipe)) =
            (child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            return StepOutput::failed_to_start(
                "Failed to capture command output pipes".to_string(),
            );
        };

        let wait_and_collect = async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let (stdout_read, stderr_read, status) = tokio::join!(
                stdout_pipe.read_to_end(&mut stdout_buf),
                stderr_pipe.read_to_end(&mut stderr_buf),
                child.wait(),
            );
            stdout_read?;
            stderr_read?;
            let status = status?;
            Ok::<_, std::io::Error>((
                String::from_utf8_lossy(&stdout_buf).into_owned(),
                String::from_utf8_lossy(&stderr_buf).into_owned(),
                status,
            ))
        };

        match tokio::time::timeout(request.timeout, wait_and_collect).await {
            Ok(Ok((stdout, stderr, status))) => {
                // A signal-terminated child has no exit code; fold it into
                // the reserved -1 like other abnormal endings.
                let exit_code = status.code().unwrap_or(-1);
                StepOutput::from_exit(exit_code, stdout, stderr)
            }
            Ok(Err(e)) => {
                warn!(command = %request.command, error = %e, "Failed waiting on workflow command");
                StepOutput::failed_to_start(format!("Failed to run command: {e}"))
            }
            Err(_) => {
                warn!(
                    command = %request.command,
                    timeout_secs = request.timeout.as_secs(),
                    "Workflow command timed out, killing child"
                );
                let _ = child.start_kill();
                let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
                StepOutput::timed_out()
            }
        }
    }
}
