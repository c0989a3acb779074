//! External process execution
//!
//! Two primitives live here: `ShellRunner` runs one command to completion
//! with a hard timeout, and `StreamingChild` exposes a child process as a
//! deadline-bounded, line-oriented source that can be force-killed.

pub mod command;
pub mod stream;

pub use command::{CommandRequest, CommandRunner, ShellRunner, StepOutput, DEFAULT_STEP_TIMEOUT};
pub use stream::{LineRead, StreamingChild};
