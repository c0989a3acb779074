//! Contract template installation for a scenario.
//!
//! Before the contract setup step can run, the scenario's template has to be
//! copied into the demo tree, its `${VAR}` placeholders substituted from the
//! merged environment, and the demo's own update script run over the result.
//! Substitution is delegated to `envsubst` rather than reimplemented, so the
//! behavior stays byte-identical to running the demo by hand.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::runner::{CommandRequest, CommandRunner};
use crate::scenarios::Scenario;
use crate::session::SharedSession;

use super::orchestrator::WorkflowError;

/// Result of installing a scenario's contract template.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateReport {
    pub scenario: Scenario,
    pub success: bool,
    pub output: String,
    /// The generated contract, when it could be read back and parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<serde_json::Value>,
}

/// Copies, substitutes and finalizes a scenario's contract template.
pub struct TemplateInstaller {
    runner: Arc<dyn CommandRunner>,
    project_root: PathBuf,
}

impl TemplateInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            project_root: project_root.into(),
        }
    }

    /// Install `scenario`'s template for the given session and remember the
    /// scenario choice on it.
    pub async fn install(
        &self,
        session: &SharedSession,
        scenario: Scenario,
    ) -> Result<TemplateReport, WorkflowError> {
        let mut session = session.lock().await;
        session.scenario = Some(scenario);

        let mut env: HashMap<String, String> = session.config.clone();
        env.extend(scenario.variables());

        let source = self
            .project_root
            .join("quick-demos")
            .join(scenario.template());
        let destination = self
            .project_root
            .join("demo/contract/contract_template.json");
        tokio::fs::copy(&source, &destination)
            .await
            .map_err(|source| WorkflowError::TemplateCopy { scenario, source })?;

        info!(
            session = %session.id,
            scenario = %scenario,
            template = %source.display(),
            "Installing contract template"
        );

        let substitute = self
            .runner
            .run(
                CommandRequest::new(
                    "envsubst < demo/contract/contract_template.json \
                     > demo/contract/contract.json",
                )
                .envs(&env),
            )
            .await;
        if !substitute.success {
            return Ok(TemplateReport {
                scenario,
                success: false,
                output: substitute.formatted_output(),
                contract: None,
            });
        }

        let update = self
            .runner
            .run(CommandRequest::new("./demo/contract/update-contract.sh").envs(&env))
            .await;

        let contract = self.read_contract().await;
        Ok(TemplateReport {
            scenario,
            success: update.success,
            output: update.formatted_output(),
            contract,
        })
    }

    async fn read_contract(&self) -> Option<serde_json::Value> {
        let path = self.project_root.join("demo/contract/contract.json");
        let bytes = tokio::fs::read(&path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
