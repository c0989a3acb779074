use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gate::ArtifactPaths;

/// Main configuration structure for Contract Conductor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConductorConfig {
    /// Workflow execution settings
    pub workflow: WorkflowConfig,
    /// Filesystem locations consulted for step artifacts
    pub artifacts: ArtifactConfig,
    /// Session bookkeeping settings
    pub sessions: SessionConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Directory the shell scripts run from (the demo checkout root)
    pub project_root: String,
    /// Hard per-step wall-clock limit in seconds
    pub step_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    /// Where signed contract entries land (`<prefix>.<seq>.cose`)
    pub contracts_dir: String,
    /// Parent of per-user identity directories (`<user>/did.json`)
    pub identity_root: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are swept from the store
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig {
                project_root: ".".to_string(),
                step_timeout_seconds: 120,
            },
            artifacts: ArtifactConfig {
                contracts_dir: "/tmp/contracts".to_string(),
                identity_root: "/tmp".to_string(),
            },
            sessions: SessionConfig { ttl_minutes: 60 },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl ConductorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. conductor.toml in the working directory
    /// 3. Environment variables (prefixed with CONDUCTOR__)
    ///
    /// `.env` is loaded first so that CONDUCTOR__ overrides placed there are
    /// visible when the builder reads the process environment.
    pub fn load() -> Result<Self> {
        Self::load_env_file()?;

        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("workflow.project_root", defaults.workflow.project_root)?
            .set_default(
                "workflow.step_timeout_seconds",
                defaults.workflow.step_timeout_seconds,
            )?
            .set_default("artifacts.contracts_dir", defaults.artifacts.contracts_dir)?
            .set_default("artifacts.identity_root", defaults.artifacts.identity_root)?
            .set_default("sessions.ttl_minutes", defaults.sessions.ttl_minutes)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.json_logs", defaults.observability.json_logs)?;

        if Path::new("conductor.toml").exists() {
            builder = builder.add_source(File::with_name("conductor"));
        }

        builder = builder.add_source(
            Environment::with_prefix("CONDUCTOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load .env file if it exists. Runs before the tracing subscriber is
    /// installed, so keep the log at debug.
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::debug!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow.step_timeout_seconds)
    }

    pub fn project_root(&self) -> PathBuf {
        PathBuf::from(&self.workflow.project_root)
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.artifacts.contracts_dir, &self.artifacts.identity_root)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.sessions.ttl_minutes)
    }
}

/// Placeholder configuration every fresh session starts from. Operators
/// replace these before running any step that talks to a real service.
pub fn default_session_config() -> HashMap<String, String> {
    HashMap::from([
        ("TDP_USERNAME".to_string(), "<tdp-username>".to_string()),
        ("TDC_USERNAME".to_string(), "<tdc-username>".to_string()),
        ("CCRP_USERNAME".to_string(), "<ccrp-username>".to_string()),
        (
            "AZURE_STORAGE_ACCOUNT_NAME".to_string(),
            "<storage-account-name>".to_string(),
        ),
        (
            "AZURE_KEYVAULT_ENDPOINT".to_string(),
            "<akv>.vault.azure.net".to_string(),
        ),
        (
            "CONTRACT_SERVICE_URL".to_string(),
            "https://<contract-service-url>:<port>".to_string(),
        ),
    ])
}
