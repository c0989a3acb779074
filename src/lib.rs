// Contract Conductor Library - Multi-Party Contract Workflow Orchestration
// This exposes the core components for testing and integration

pub mod config;
pub mod extract;
pub mod gate;
pub mod github_auth;
pub mod runner;
pub mod scenarios;
pub mod session;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{default_session_config, ConductorConfig};
pub use extract::extract_sequence_number;
pub use gate::{ArtifactPaths, MissingArtifact};
pub use github_auth::{auth_status, login_with_token, logout, DeviceAuthOutcome, DeviceAuthRace};
pub use runner::{CommandRequest, CommandRunner, ShellRunner, StepOutput, StreamingChild};
pub use scenarios::Scenario;
pub use session::{Role, Session, SessionStore, SharedSession};
pub use telemetry::init_telemetry;
pub use workflow::{Step, StepOrchestrator, StepReport, TemplateInstaller, WorkflowError};
