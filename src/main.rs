use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;

use contract_conductor::config::{default_session_config, ConductorConfig};
use contract_conductor::github_auth::{self, DeviceAuthOutcome, DeviceAuthRace};
use contract_conductor::runner::ShellRunner;
use contract_conductor::scenarios::Scenario;
use contract_conductor::session::{Role, SessionStore};
use contract_conductor::telemetry::init_telemetry;
use contract_conductor::workflow::{Step, StepOrchestrator, TemplateInstaller};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Multi-party contract signing workflow orchestration")]
#[command(
    long_about = "Conductor drives the contract signing demo end to end: it runs the \
                  numbered demo scripts in order, tracks the registered sequence number, \
                  and gates dependent steps on the artifacts earlier steps produce. \
                  Start with 'conductor steps' to see the workflow."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workflow steps in order within a fresh session
    Run {
        /// Demo scenario supplying contract template variables
        #[arg(long, help = "Scenario: brats, covid, credit-risk")]
        scenario: Option<Scenario>,
        /// Party running the workflow
        #[arg(long, help = "Role: provider or consumer")]
        role: Option<CliRole>,
        /// Session configuration overrides, repeatable
        #[arg(long = "config", value_name = "KEY=VALUE", help = "Override a session config value (e.g. TDP_USERNAME=alice)")]
        config: Vec<String>,
        /// Extra environment for the scripts, repeatable
        #[arg(long = "env", value_name = "KEY=VALUE", help = "Extra environment variable for this run")]
        env: Vec<String>,
        /// Steps to run, in workflow order
        #[arg(value_name = "STEP", help = "Step names (see 'conductor steps'); omit with --all to run everything")]
        steps: Vec<Step>,
        /// Run all twelve steps in order
        #[arg(long, help = "Run the full workflow instead of named steps")]
        all: bool,
        /// Emit step reports as JSON lines
        #[arg(long, help = "Machine-readable output, one JSON report per step")]
        json: bool,
        /// Keep going after a failed step
        #[arg(long, help = "Do not stop at the first failing step")]
        keep_going: bool,
    },
    /// Install a scenario's contract template into the demo tree
    Template {
        /// Scenario whose template to install
        #[arg(long, help = "Scenario: brats, covid, credit-risk")]
        scenario: Scenario,
        /// Session configuration overrides, repeatable
        #[arg(long = "config", value_name = "KEY=VALUE")]
        config: Vec<String>,
    },
    /// List the workflow steps in execution order
    Steps,
    /// List available scenarios and their variables
    Scenarios,
    /// GitHub CLI authentication
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Show who is currently logged in to the GitHub CLI
    Status,
    /// Start a browser-free device login and print the one-time code
    LoginWeb,
    /// Log in with a personal access token
    LoginToken {
        /// Token starting with ghp_ or github_pat_
        token: String,
    },
    /// Log out of the GitHub CLI
    Logout,
}

/// CLI spelling of the two workflow roles.
#[derive(Clone, Copy, clap::ValueEnum)]
enum CliRole {
    Provider,
    Consumer,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Provider => Role::DataProvider,
            CliRole::Consumer => Role::DataConsumer,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConductorConfig::load()?;
    init_telemetry(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;

    match cli.command {
        Commands::Run {
            scenario,
            role,
            config: config_overrides,
            env,
            steps,
            all,
            json,
            keep_going,
        } => tokio::runtime::Runtime::new()?.block_on(async {
            run_command(
                &config,
                scenario,
                role.map(Role::from),
                config_overrides,
                env,
                steps,
                all,
                json,
                keep_going,
            )
            .await
        }),
        Commands::Template {
            scenario,
            config: config_overrides,
        } => tokio::runtime::Runtime::new()?.block_on(async {
            template_command(&config, scenario, config_overrides).await
        }),
        Commands::Steps => {
            steps_command();
            Ok(())
        }
        Commands::Scenarios => {
            scenarios_command();
            Ok(())
        }
        Commands::Auth { command } => tokio::runtime::Runtime::new()?.block_on(async {
            auth_command(&config, command).await
        }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    config: &ConductorConfig,
    scenario: Option<Scenario>,
    role: Option<Role>,
    config_overrides: Vec<String>,
    env: Vec<String>,
    steps: Vec<Step>,
    all: bool,
    json: bool,
    keep_going: bool,
) -> Result<()> {
    let steps: Vec<Step> = if all {
        Step::ALL.to_vec()
    } else if steps.is_empty() {
        return Err(anyhow!(
            "No steps requested. Name steps to run, or pass --all for the full workflow."
        ));
    } else {
        steps
    };

    let overrides = parse_key_values(&env)?;
    let session_config = parse_key_values(&config_overrides)?;

    let store = SessionStore::new();
    let (_, session) = store.create();
    {
        let mut session = session.lock().await;
        session.update_config(&default_session_config());
        session.update_config(&session_config);
        session.scenario = scenario;
        session.role = role;
    }

    let runner = Arc::new(ShellRunner::new(config.project_root()));
    let orchestrator = StepOrchestrator::new(runner, config.artifact_paths())
        .with_step_timeout(config.step_timeout());

    let mut failures = 0u32;
    for step in steps {
        if !json {
            println!("▶️  [{:>2}/12] {}", step.ordinal(), step);
        }

        match orchestrator.execute(&session, step, &overrides).await {
            Ok(report) => {
                if json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    if !report.output.is_empty() {
                        println!("{}", report.output);
                    }
                    if let Some(sequence_number) = report.sequence_number {
                        println!("📋 Sequence number: {sequence_number}");
                    }
                    if report.success {
                        println!("✅ {step} complete");
                    } else {
                        println!("❌ {step} failed (exit code {})", report.exit_code);
                    }
                    println!();
                }
                if !report.success {
                    failures += 1;
                    if !keep_going {
                        break;
                    }
                }
            }
            Err(e) => {
                if json {
                    eprintln!("{e}");
                } else {
                    println!("❌ {step} blocked: {e}");
                    println!();
                }
                failures += 1;
                if !keep_going {
                    break;
                }
            }
        }
    }

    let session = session.lock().await;
    if !json {
        println!(
            "Session {}: {} step(s) completed{}",
            session.id,
            session.completed_steps.len(),
            session
                .sequence_number
                .map(|n| format!(", sequence number {n}"))
                .unwrap_or_default()
        );
    }

    if failures > 0 {
        Err(anyhow!("{failures} step(s) did not complete"))
    } else {
        Ok(())
    }
}

async fn template_command(
    config: &ConductorConfig,
    scenario: Scenario,
    config_overrides: Vec<String>,
) -> Result<()> {
    let session_config = parse_key_values(&config_overrides)?;

    let store = SessionStore::new();
    let (_, session) = store.create();
    {
        let mut session = session.lock().await;
        session.update_config(&default_session_config());
        session.update_config(&session_config);
    }

    let runner = Arc::new(ShellRunner::new(config.project_root()));
    let installer = TemplateInstaller::new(runner, config.project_root());
    let report = installer.install(&session, scenario).await?;

    if !report.output.is_empty() {
        println!("{}", report.output);
    }
    if report.success {
        println!("✅ Contract template for '{scenario}' installed");
        Ok(())
    } else {
        Err(anyhow!("Contract template installation failed"))
    }
}

fn steps_command() {
    println!("Workflow steps, in execution order:");
    println!();
    for step in Step::ALL {
        println!("  {:>2}. {}", step.ordinal(), step.as_str());
    }
    println!();
    println!("Run them with: conductor run --all --scenario brats --role provider");
}

fn scenarios_command() {
    println!("Available scenarios:");
    println!();
    for scenario in Scenario::ALL {
        println!("  {} - {}", scenario.as_str(), scenario.display_name());
        println!("      {}", scenario.description());
    }
}

async fn auth_command(config: &ConductorConfig, command: AuthCommands) -> Result<()> {
    let runner = ShellRunner::new(config.project_root());

    match command {
        AuthCommands::Status => {
            let status = github_auth::auth_status(&runner).await;
            if status.logged_in {
                println!(
                    "✅ Logged in as {}",
                    status.username.as_deref().unwrap_or("unknown")
                );
            } else {
                println!("❌ Not logged in to the GitHub CLI");
                println!("   → Try: conductor auth login-web");
            }
        }
        AuthCommands::LoginWeb => {
            let race = DeviceAuthRace::new();
            match race.login(&config.project_root()).await? {
                DeviceAuthOutcome::CodeFound {
                    code,
                    verification_url,
                    ..
                } => {
                    println!("🔑 One-time code: {code}");
                    println!("   Enter it at {verification_url} to finish logging in.");
                }
                DeviceAuthOutcome::DeadlineExpired { output } => {
                    println!("❌ No device code appeared in time. Try again.");
                    if !output.is_empty() {
                        println!("{output}");
                    }
                }
            }
        }
        AuthCommands::LoginToken { token } => {
            let result = github_auth::login_with_token(&runner, &token).await?;
            if result.success {
                println!("✅ {}", result.output);
            } else {
                println!("❌ Token login failed");
                println!("{}", result.output);
            }
        }
        AuthCommands::Logout => {
            github_auth::logout(&runner).await;
            println!("👋 Logged out of the GitHub CLI");
        }
    }
    Ok(())
}

/// Parse repeated KEY=VALUE arguments into a map; later repeats win.
fn parse_key_values(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{pair}'"))?;
        if key.is_empty() {
            return Err(anyhow!("Empty key in '{pair}'"));
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}
