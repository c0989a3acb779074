//! Line-oriented streaming access to a child process.
//!
//! Unlike `ShellRunner`, the caller drives the read loop and owns the
//! deadline: `next_line` never blocks past the wait it was given, even while
//! the child keeps running. Used by the device-authorization race, which must
//! kill the child the moment the one-time code appears.
//!
//! stderr is not piped separately; commands that want it merged append
//! `2>&1`, which works because everything runs under `bash -c`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

/// How long `kill` waits for the child to be reclaimed.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Outcome of a single bounded read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A full line was available within the wait.
    Line(String),
    /// Nothing arrived before the wait elapsed; the child is still running.
    TimedOut,
    /// The child closed its stdout (or the pipe failed).
    Eof,
}

/// A spawned child whose stdout is consumed line by line.
///
/// The handle is never shared: whoever spawns it owns termination.
#[derive(Debug)]
pub struct StreamingChild {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl StreamingChild {
    /// Spawn `command` under `bash -c` with the given environment overrides
    /// merged on top of this process's environment.
    pub fn spawn(
        command: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> std::io::Result<Self> {
        let mut builder = Command::new("bash");
        builder
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            builder.env(key, value);
        }

        let mut child = builder.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::other("child stdout was not captured")
        })?;

        debug!(command = %command, pid = ?child.id(), "Spawned streaming child");

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Wait up to `max_wait` for the next line of output.
    pub async fn next_line(&mut self, max_wait: Duration) -> LineRead {
        match tokio::time::timeout(max_wait, self.lines.next_line()).await {
            Err(_) => LineRead::TimedOut,
            Ok(Ok(Some(line))) => LineRead::Line(line),
            Ok(Ok(None)) => LineRead::Eof,
            Ok(Err(e)) => {
                warn!(error = %e, "Streaming child stdout read failed");
                LineRead::Eof
            }
        }
    }

    /// Force-kill the child, then wait briefly for it to be reclaimed.
    ///
    /// Termination intent is best-effort-confirmed: if the OS does not reap
    /// within the grace window the failure is swallowed, never propagated.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            // Already exited is the common case here.
            debug!(error = %e, "Streaming child kill signal not delivered");
        }
        if tokio::time::timeout(KILL_GRACE, self.child.wait())
            .await
            .is_err()
        {
            warn!(pid = ?self.child.id(), "Streaming child not reaped within grace period");
        }
    }

    /// Whether the child has already exited (without blocking).
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}
