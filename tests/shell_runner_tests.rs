//! Shell runner integration tests
//!
//! These run real child processes through bash, so they exercise the whole
//! spawn/capture/timeout/reap path rather than mocks.
//!
//! Test coverage:
//! - stdout/stderr captured separately and joined deterministically
//! - Exit codes pass through; -1 is reserved for timeout and spawn failure
//! - Environment overrides reach the child; later keys win
//! - A hung command comes back as a timeout well before its natural runtime
//! - `source`-style shell directives work (commands run under bash)

use std::time::{Duration, Instant};

use contract_conductor::runner::{
    CommandRequest, CommandRunner, ShellRunner, StepOutput,
};

fn runner() -> ShellRunner {
    ShellRunner::new(std::env::temp_dir())
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let output = runner().run(CommandRequest::new("echo hello")).await;
    assert!(output.success);
    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout.trim(), "hello");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn captures_stderr_separately() {
    let output = runner()
        .run(CommandRequest::new("echo out; echo err >&2"))
        .await;
    assert_eq!(output.stdout.trim(), "out");
    assert_eq!(output.stderr.trim(), "err");
    assert_eq!(
        output.formatted_output(),
        "out\n\n--- Debug/Trace Output ---\nerr"
    );
}

#[tokio::test]
async fn nonzero_exit_is_failure_not_error() {
    let output = runner().run(CommandRequest::new("exit 7")).await;
    assert!(!output.success);
    assert_eq!(output.exit_code, 7);
}

#[tokio::test]
async fn environment_overrides_reach_the_child() {
    let output = runner()
        .run(
            CommandRequest::new("echo \"$GREETING\"")
                .env("GREETING", "howdy"),
        )
        .await;
    assert_eq!(output.stdout.trim(), "howdy");
}

#[tokio::test]
async fn shell_directives_are_available() {
    // `source` only exists inside a shell; a bare exec would fail.
    let dir = tempfile::TempDir::new().expect("tempdir");
    let script = dir.path().join("vars.sh");
    std::fs::write(&script, "MESSAGE=sourced\n").expect("write script");

    let output = runner()
        .run(CommandRequest::new(format!(
            "source {} && echo \"$MESSAGE\"",
            script.display()
        )))
        .await;
    assert!(output.success, "stderr: {}", output.stderr);
    assert_eq!(output.stdout.trim(), "sourced");
}

#[tokio::test]
async fn hung_command_times_out_with_reserved_exit_code() {
    let started = Instant::now();
    let output = runner()
        .run(
            CommandRequest::new("sleep 30")
                .timeout(Duration::from_millis(200)),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(!output.success);
    assert_eq!(output.exit_code, -1);
    assert_eq!(output.stderr, "Command timed out");
    assert!(
        elapsed < Duration::from_secs(5),
        "timeout took {elapsed:?}, child was not killed promptly"
    );
}

#[tokio::test]
async fn timeout_kills_the_child_process() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let marker = dir.path().join("survived");

    let output = runner()
        .run(
            CommandRequest::new(format!(
                "sleep 1 && touch {}",
                marker.display()
            ))
            .timeout(Duration::from_millis(100)),
        )
        .await;
    assert_eq!(output.exit_code, -1);

    // Give a surviving child time to reach the touch, then check it never
    // did.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "child outlived its timeout");
}

#[tokio::test]
async fn partial_output_before_timeout_is_discarded() {
    let output = runner()
        .run(
            CommandRequest::new("echo early; sleep 30")
                .timeout(Duration::from_millis(200)),
        )
        .await;
    // The timeout result is uniform regardless of what the child printed.
    assert_eq!(output.stdout, "");
    assert_eq!(output.stderr, "Command timed out");
}

#[tokio::test]
async fn formatted_output_handles_empty_streams() {
    let silent = StepOutput::from_exit(0, String::new(), String::new());
    assert_eq!(silent.formatted_output(), "");

    let stderr_only = StepOutput::from_exit(1, String::new(), "only err\n".to_string());
    assert_eq!(stderr_only.formatted_output(), "only err");
}
