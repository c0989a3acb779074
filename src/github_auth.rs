//! GitHub CLI authentication flows.
//!
//! The interesting piece is the device-flow race: `gh auth login --web`
//! prints a one-time code and then opens a browser. We want the code but
//! never the browser, so the child's output is polled against a hard
//! 2-second budget and the process is killed in the same tick the code
//! appears. `BROWSER=/bin/true` is exported as a second line of defense in
//! case the child wins the race anyway.
//!
//! Status, token login and logout are ordinary one-shot commands through the
//! `CommandRunner` seam.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::runner::{CommandRequest, CommandRunner, LineRead, StreamingChild};

/// Where the user enters the device code.
pub const DEVICE_LOGIN_URL: &str = "https://github.com/login/device";

/// Total wall-clock budget for capturing the one-time code.
const DEVICE_CODE_BUDGET: Duration = Duration::from_secs(2);

/// Upper bound for a single poll so the loop can re-check the deadline.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// XXXX-XXXX one-time code as `gh` prints it.
static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z0-9]{4}-[A-Z0-9]{4})").expect("device code pattern is valid"));

/// `account <username>` as printed by `gh auth status`.
static ACCOUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"account\s+(\S+)").expect("account pattern is valid"));

/// Terminal result of the device-authorization race. Exactly one of the two
/// happens, and in both the child process is dead before this is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAuthOutcome {
    /// The one-time code was captured and the process killed before it could
    /// open a browser.
    CodeFound {
        code: String,
        verification_url: String,
        output: String,
    },
    /// The budget elapsed without a code; the accumulated output is kept for
    /// diagnostics. The caller may simply retry the whole flow.
    DeadlineExpired { output: String },
}

/// Bounded-time code capture over a streaming child process.
///
/// Owns the child handle exclusively from spawn to kill; nothing about the
/// process escapes.
#[derive(Debug, Clone)]
pub struct DeviceAuthRace {
    budget: Duration,
    poll_slice: Duration,
}

impl Default for DeviceAuthRace {
    fn default() -> Self {
        Self {
            budget: DEVICE_CODE_BUDGET,
            poll_slice: POLL_SLICE,
        }
    }
}

impl DeviceAuthRace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the budget (tests race against faster fake children).
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Start the GitHub device-flow login and race for the code.
    pub async fn login(&self, cwd: &Path) -> std::io::Result<DeviceAuthOutcome> {
        let mut env = HashMap::new();
        // No-op browser in case the kill loses the race.
        env.insert("BROWSER".to_string(), "/bin/true".to_string());
        self.run(
            "gh auth login --hostname github.com --web 2>&1",
            &env,
            cwd,
        )
        .await
    }

    /// Race an arbitrary command for a device code. Split out from `login`
    /// so the state machine is testable against a scripted child.
    pub async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> std::io::Result<DeviceAuthOutcome> {
        let mut child = StreamingChild::spawn(command, env, cwd)?;
        let deadline = Instant::now() + self.budget;
        let mut output = String::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let slice = remaining.min(self.poll_slice);

            match child.next_line(slice).await {
                LineRead::Line(line) => {
                    output.push_str(&line);
                    output.push('\n');

                    if let Some(code) = find_device_code(&line) {
                        // Kill before returning; the browser side effect is
                        // one line of output away.
                        child.kill().await;
                        info!(code = %code, "Captured device code, child terminated");
                        return Ok(DeviceAuthOutcome::CodeFound {
                            code,
                            verification_url: DEVICE_LOGIN_URL.to_string(),
                            output,
                        });
                    }
                }
                LineRead::TimedOut => continue,
                LineRead::Eof => break,
            }
        }

        // Deadline expired or stream ended without a code: the child must
        // not survive either way.
        child.kill().await;
        warn!("Device code not observed within budget");
        Ok(DeviceAuthOutcome::DeadlineExpired { output })
    }
}

/// Scan one output line for the one-time code.
fn find_device_code(line: &str) -> Option<String> {
    let lowered = line.to_lowercase();
    if !lowered.contains("one-time code") && !lowered.contains("code:") {
        return None;
    }
    CODE_PATTERN
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str().to_string())
}

/// Result of probing `gh auth status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub logged_in: bool,
    pub username: Option<String>,
    pub output: String,
}

/// Ask the GitHub CLI who, if anyone, is logged in.
pub async fn auth_status(runner: &dyn CommandRunner) -> AuthStatus {
    let output = runner
        .run(CommandRequest::new("gh auth status 2>&1"))
        .await;
    let combined = format!("{}{}", output.stdout, output.stderr);
    parse_auth_status(&combined)
}

fn parse_auth_status(output: &str) -> AuthStatus {
    let logged_in = output.contains("Logged in to");
    let username = if logged_in {
        ACCOUNT_PATTERN
            .captures(output)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().trim_matches(|c| c == '(' || c == ')').to_string())
    } else {
        None
    };
    AuthStatus {
        logged_in,
        username,
        output: output.to_string(),
    }
}

/// Outcome of a token login attempt (status re-probed to confirm).
#[derive(Debug, Clone)]
pub struct TokenLogin {
    pub success: bool,
    pub username: Option<String>,
    pub output: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "Invalid token format. Personal access tokens start with 'ghp_' or 'github_pat_'."
    )]
    InvalidTokenFormat,
}

/// Log in with a personal access token.
///
/// The token format is checked before `gh` is ever invoked, and login
/// success is judged by re-probing `gh auth status` rather than trusting the
/// login command's own output.
pub async fn login_with_token(
    runner: &dyn CommandRunner,
    token: &str,
) -> Result<TokenLogin, AuthError> {
    let token = token.trim();
    if token.is_empty()
        || !(token.starts_with("ghp_") || token.starts_with("github_pat_") || token.len() >= 40)
    {
        return Err(AuthError::InvalidTokenFormat);
    }

    let login_output = runner
        .run(CommandRequest::new(format!(
            "echo '{token}' | gh auth login --with-token 2>&1"
        )))
        .await;
    debug!(exit_code = login_output.exit_code, "Token login attempted");

    let status = auth_status(runner).await;
    let output = if status.logged_in {
        format!(
            "Successfully logged in as {}",
            status.username_or_unknown()
        )
    } else {
        format!("{}{}", login_output.stdout, login_output.stderr)
    };
    Ok(TokenLogin {
        success: status.logged_in,
        username: status.username,
        output,
    })
}

impl AuthStatus {
    fn username_or_unknown(&self) -> &str {
        self.username.as_deref().unwrap_or("unknown")
    }
}

/// Log out of the GitHub CLI. Best effort; `gh` asks for confirmation, so
/// one is piped in.
pub async fn logout(runner: &dyn CommandRunner) {
    let output = runner
        .run(CommandRequest::new(
            "echo 'Y' | gh auth logout --hostname github.com 2>&1 || true",
        ))
        .await;
    debug!(exit_code = output.exit_code, "GitHub CLI logout requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_requires_a_code_ish_line() {
        // The pattern alone is not enough; the line has to talk about a code,
        // otherwise any XXXX-XXXX token would trigger the kill.
        assert_eq!(find_device_code("random AAAA-1111 noise"), None);
        assert_eq!(
            find_device_code("! First copy your one-time code: AB12-CD34"),
            Some("AB12-CD34".to_string())
        );
        assert_eq!(
            find_device_code("Code: WXYZ-0987"),
            Some("WXYZ-0987".to_string())
        );
    }

    #[test]
    fn status_parsing_extracts_account() {
        let status = parse_auth_status(
            "github.com\n  Logged in to github.com account octocat (keyring)\n",
        );
        assert!(status.logged_in);
        assert_eq!(status.username.as_deref(), Some("octocat"));
    }

    #[test]
    fn status_parsing_handles_logged_out() {
        let status = parse_auth_status("You are not logged into any GitHub hosts.");
        assert!(!status.logged_in);
        assert_eq!(status.username, None);
    }
}
