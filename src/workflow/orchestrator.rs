//! Step execution façade: gate, run, extract, record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::extract::extract_sequence_number;
use crate::gate::{ArtifactPaths, MissingArtifact};
use crate::runner::{CommandRequest, CommandRunner, DEFAULT_STEP_TIMEOUT};
use crate::session::{Role, SharedSession};

use super::step::Step;

/// Uniform result envelope returned for every step.
///
/// `sequence_number` is populated only for registration steps, and only when
/// extraction found something; a miss is not an error.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Failures surfaced before (or instead of) a useful step result.
///
/// Process-level failures (non-zero exits, timeouts, spawn errors) are not
/// here; those come back inside the `StepReport` with the captured output so
/// the operator can read what the script said.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    PreconditionUnmet(#[from] MissingArtifact),

    #[error(
        "Step '{step}' requires a contract sequence number. \
         Run register-contract-provider first so the session holds one."
    )]
    SequenceNumberRequired { step: Step },

    #[error(
        "Step '{step}' needs the '{key}' configuration value. \
         Set it on the session config before running this step."
    )]
    MissingConfig { key: &'static str, step: Step },

    #[error("No session with id '{0}'. It may have been swept; start a new run.")]
    SessionNotFound(String),

    #[error(
        "Could not install the '{scenario}' contract template: {source}. \
         Check that quick-demos/ exists under the project root."
    )]
    TemplateCopy {
        scenario: crate::scenarios::Scenario,
        #[source]
        source: std::io::Error,
    },
}

/// Drives one step at a time: resolves preconditions, builds the merged
/// environment, runs the external command, extracts the sequence number
/// where applicable, and records durable facts on the session.
///
/// The session lock is held for the entire call, so concurrent requests
/// against the same session (double-clicks, racing tabs) serialize instead
/// of interleaving their read-then-update of `sequence_number`.
pub struct StepOrchestrator {
    runner: Arc<dyn CommandRunner>,
    artifacts: ArtifactPaths,
    step_timeout: Duration,
}

impl StepOrchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, artifacts: ArtifactPaths) -> Self {
        Self {
            runner,
            artifacts,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Execute one step for one session.
    ///
    /// A failed step neither retries nor poisons the session; the caller may
    /// simply run the same step again.
    pub async fn execute(
        &self,
        session: &SharedSession,
        step: Step,
        overrides: &HashMap<String, String>,
    ) -> Result<StepReport, WorkflowError> {
        let mut session = session.lock().await;

        self.check_preconditions(&session, step)?;

        let command = step.command(&session)?;

        // Session config first, scenario variables on top, per-call
        // overrides last; later keys win.
        let mut env = session.config.clone();
        if let Some(scenario) = session.scenario {
            env.extend(scenario.variables());
        }
        for (key, value) in overrides {
            env.insert(key.clone(), value.clone());
        }

        info!(
            session = %session.id,
            step = %step,
            ordinal = step.ordinal(),
            "Executing workflow step"
        );

        let request = CommandRequest::new(command)
            .envs(&env)
            .timeout(self.step_timeout);
        let output = self.runner.run(request).await;
        let formatted = output.formatted_output();

        let extracted = if step.extracts_sequence_number() {
            extract_sequence_number(&formatted)
        } else {
            None
        };

        // The retrieve script reports success even when nothing landed on
        // disk; treat the absent ledger entry as the unmet precondition it
        // is for every step that follows. Keep the script's output in the
        // guidance so the run is not reported as a silent miss.
        if step == Step::RetrieveContract && output.success {
            if let Some(seq) = session.sequence_number {
                if let Err(mut missing) = self
                    .artifacts
                    .require_ledger_entry(seq, Step::RetrieveContract.as_str())
                {
                    if !formatted.is_empty() {
                        missing.guidance =
                            format!("{}\n\nScript output:\n{}", missing.guidance, formatted);
                    }
                    return Err(missing.into());
                }
            }
        }

        if output.success {
            session.mark_step_completed(step);
            if let Some(seq) = extracted {
                session.record_sequence_number(seq);
            }
            if let Some(role) = step.creates_did_for() {
                session.mark_did_created(role);
            }
            info!(
                session = %session.id,
                step = %step,
                sequence_number = ?extracted,
                "Workflow step completed"
            );
        } else {
            warn!(
                session = %session.id,
                step = %step,
                exit_code = output.exit_code,
                "Workflow step failed"
            );
        }

        Ok(StepReport {
            step,
            success: output.success,
            output: formatted,
            exit_code: output.exit_code,
            sequence_number: extracted,
        })
    }

    /// Gates that must hold before a step's process is spawned.
    fn check_preconditions(
        &self,
        session: &crate::session::Session,
        step: Step,
    ) -> Result<(), WorkflowError> {
        if step == Step::SignContractConsumer {
            let seq = session
                .sequence_number
                .ok_or(WorkflowError::SequenceNumberRequired { step })?;
            self.artifacts
                .require_ledger_entry(seq, Step::RetrieveContract.as_str())?;

            let username = session.username_for(Role::DataConsumer).ok_or(
                WorkflowError::MissingConfig {
                    key: Role::DataConsumer.username_key(),
                    step,
                },
            )?;
            self.artifacts
                .require_did_document(username, Step::CreateDidConsumer.as_str())?;
        }
        Ok(())
    }
}
