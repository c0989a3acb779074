//! Workflow orchestration tests
//!
//! These tests drive the step orchestrator against a scripted command runner
//! so no external scripts are needed.
//!
//! Test coverage:
//! - Register steps extract and record the contract sequence number
//! - Failed steps leave the session untouched and can be retried
//! - Dependent steps are blocked until their artifacts exist
//! - Environment merge precedence: session config, scenario, overrides
//! - DID creation flags follow the corresponding steps

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use contract_conductor::gate::ArtifactPaths;
use contract_conductor::runner::{CommandRequest, CommandRunner, StepOutput};
use contract_conductor::scenarios::Scenario;
use contract_conductor::session::{Role, SessionStore, SharedSession};
use contract_conductor::workflow::{Step, StepOrchestrator, WorkflowError};

/// Runner that returns canned outputs and records every request it sees.
#[derive(Clone)]
struct ScriptedRunner {
    requests: Arc<Mutex<Vec<CommandRequest>>>,
    responses: Arc<Mutex<Vec<StepOutput>>>,
}

impl ScriptedRunner {
    fn new(responses: Vec<StepOutput>) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    fn succeeding_with(stdout: &str) -> Self {
        Self::new(vec![StepOutput::from_exit(
            0,
            stdout.to_string(),
            String::new(),
        )])
    }

    fn recorded_requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, request: CommandRequest) -> StepOutput {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            StepOutput::from_exit(0, String::new(), String::new())
        } else {
            responses.remove(0)
        }
    }
}

fn provider_session(store: &SessionStore) -> SharedSession {
    let (_, session) = store.create();
    {
        let mut guard = session.try_lock().expect("fresh session is unlocked");
        guard.config.insert(
            "TDP_USERNAME".to_string(),
            "acme-provider".to_string(),
        );
        guard.config.insert(
            "TDC_USERNAME".to_string(),
            "acme-consumer".to_string(),
        );
        guard.role = Some(Role::DataProvider);
    }
    session
}

fn temp_artifacts() -> (tempfile::TempDir, ArtifactPaths) {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let paths = ArtifactPaths::new(dir.path(), dir.path());
    (dir, paths)
}

#[tokio::test]
async fn register_step_records_sequence_number_on_session() {
    let runner = Arc::new(ScriptedRunner::succeeding_with(
        "Submitted to ledger, see 2.26.cose",
    ));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);

    let report = orchestrator
        .execute(&session, Step::RegisterContractProvider, &HashMap::new())
        .await
        .expect("step should run");

    assert!(report.success);
    assert_eq!(report.sequence_number, Some(26));

    let session = session.lock().await;
    assert_eq!(session.sequence_number, Some(26));
    assert_eq!(
        session.completed_steps,
        vec![Step::RegisterContractProvider]
    );
}

#[tokio::test]
async fn non_register_steps_never_touch_the_sequence_number() {
    let runner = Arc::new(ScriptedRunner::succeeding_with(
        "validation passed, checked 9999 records",
    ));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);

    let report = orchestrator
        .execute(&session, Step::Validate, &HashMap::new())
        .await
        .expect("step should run");

    assert!(report.success);
    assert_eq!(report.sequence_number, None);
    assert_eq!(session.lock().await.sequence_number, None);
}

#[tokio::test]
async fn failed_step_is_reported_but_not_recorded() {
    let runner = Arc::new(ScriptedRunner::new(vec![StepOutput::from_exit(
        3,
        String::new(),
        "boom".to_string(),
    )]));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);

    let report = orchestrator
        .execute(&session, Step::ContractSetup, &HashMap::new())
        .await
        .expect("a failing script is still a report, not an error");

    assert!(!report.success);
    assert_eq!(report.exit_code, 3);
    assert!(report.output.contains("boom"));
    assert!(session.lock().await.completed_steps.is_empty());
}

#[tokio::test]
async fn failed_step_can_be_retried() {
    let runner = Arc::new(ScriptedRunner::new(vec![
        StepOutput::from_exit(1, String::new(), "transient".to_string()),
        StepOutput::from_exit(0, "ok".to_string(), String::new()),
    ]));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);

    let first = orchestrator
        .execute(&session, Step::ContractSetup, &HashMap::new())
        .await
        .expect("report");
    assert!(!first.success);

    let second = orchestrator
        .execute(&session, Step::ContractSetup, &HashMap::new())
        .await
        .expect("report");
    assert!(second.success);
    assert_eq!(
        session.lock().await.completed_steps,
        vec![Step::ContractSetup]
    );
}

#[tokio::test]
async fn consumer_signing_requires_the_retrieved_contract() {
    let runner = Arc::new(ScriptedRunner::succeeding_with("unreachable"));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner.clone(), artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);
    session.lock().await.record_sequence_number(26);

    let err = orchestrator
        .execute(&session, Step::SignContractConsumer, &HashMap::new())
        .await
        .expect_err("missing ledger entry must block the step");

    match &err {
        WorkflowError::PreconditionUnmet(missing) => {
            let message = missing.to_string();
            assert!(message.contains("2.26.cose"), "message: {message}");
            assert!(message.contains("retrieve-contract"), "message: {message}");
        }
        other => panic!("expected PreconditionUnmet, got {other:?}"),
    }
    assert!(
        runner.recorded_requests().is_empty(),
        "blocked step must not spawn anything"
    );
}

#[tokio::test]
async fn consumer_signing_requires_a_sequence_number_first() {
    let runner = Arc::new(ScriptedRunner::succeeding_with("unreachable"));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);

    let err = orchestrator
        .execute(&session, Step::SignContractConsumer, &HashMap::new())
        .await
        .expect_err("no sequence number yet");
    assert!(matches!(
        err,
        WorkflowError::SequenceNumberRequired { .. }
    ));
}

#[tokio::test]
async fn consumer_signing_runs_once_artifacts_exist() {
    let runner = Arc::new(ScriptedRunner::succeeding_with("signed"));
    let dir = tempfile::TempDir::new().expect("tempdir");
    let artifacts = ArtifactPaths::new(dir.path(), dir.path());

    // Materialize what retrieve-contract and create-did-consumer would have
    // written.
    std::fs::write(artifacts.ledger_entry(26), b"cose").expect("write ledger entry");
    std::fs::create_dir_all(dir.path().join("acme-consumer")).expect("mkdir");
    std::fs::write(artifacts.did_document("acme-consumer"), b"{}").expect("write did");

    let orchestrator = StepOrchestrator::new(runner.clone(), artifacts);
    let store = SessionStore::new();
    let session = provider_session(&store);
    session.lock().await.record_sequence_number(26);

    let report = orchestrator
        .execute(&session, Step::SignContractConsumer, &HashMap::new())
        .await
        .expect("step should run");
    assert!(report.success);

    let requests = runner.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert!(
        requests[0].command.contains("26"),
        "sequence number must be passed to the script: {}",
        requests[0].command
    );
}

#[tokio::test]
async fn retrieve_reports_missing_artifact_after_running() {
    // The retrieve script exits 0 but the expected ledger entry never
    // appears on disk.
    let runner = Arc::new(ScriptedRunner::succeeding_with("retrieved"));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);
    session.lock().await.record_sequence_number(26);

    let err = orchestrator
        .execute(&session, Step::RetrieveContract, &HashMap::new())
        .await
        .expect_err("missing output artifact must be surfaced");
    match err {
        WorkflowError::PreconditionUnmet(missing) => {
            let message = missing.to_string();
            assert!(message.contains("2.26.cose"));
            // The script ran; its output must survive into the report
            // rather than being dropped with the failed check.
            assert!(
                message.contains("retrieved"),
                "script output missing from {message:?}"
            );
        }
        other => panic!("expected PreconditionUnmet, got {other:?}"),
    }
}

#[tokio::test]
async fn environment_merge_precedence_is_config_scenario_overrides() {
    let runner = Arc::new(ScriptedRunner::succeeding_with("ok"));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner.clone(), artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);
    {
        let mut guard = session.lock().await;
        guard.scenario = Some(Scenario::Covid);
        // Conflicts with the scenario variable; the scenario must win.
        guard.config.insert(
            "AZURE_ICMR_CONTAINER_NAME".to_string(),
            "from-config".to_string(),
        );
    }

    let overrides = HashMap::from([
        // Conflicts with session config; the override must win.
        ("TDP_USERNAME".to_string(), "override-user".to_string()),
    ]);

    orchestrator
        .execute(&session, Step::ContractSetup, &overrides)
        .await
        .expect("step should run");

    let requests = runner.recorded_requests();
    assert_eq!(requests.len(), 1);
    let env = &requests[0].env;
    assert_eq!(env.get("TDP_USERNAME").map(String::as_str), Some("override-user"));
    assert_eq!(
        env.get("AZURE_ICMR_CONTAINER_NAME").map(String::as_str),
        Some("icmrcontainer")
    );
    assert_eq!(
        env.get("TDC_USERNAME").map(String::as_str),
        Some("acme-consumer")
    );
}

#[tokio::test]
async fn did_steps_flip_the_did_flags() {
    let runner = Arc::new(ScriptedRunner::new(vec![
        StepOutput::from_exit(0, "did created".to_string(), String::new()),
        StepOutput::from_exit(0, "did created".to_string(), String::new()),
    ]));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let session = provider_session(&store);

    orchestrator
        .execute(&session, Step::CreateDidProvider, &HashMap::new())
        .await
        .expect("provider did step");
    {
        let guard = session.lock().await;
        assert!(guard.did_created.provider);
        assert!(!guard.did_created.consumer);
    }

    orchestrator
        .execute(&session, Step::CreateDidConsumer, &HashMap::new())
        .await
        .expect("consumer did step");
    let guard = session.lock().await;
    assert!(guard.did_created.provider);
    assert!(guard.did_created.consumer);
}

#[tokio::test]
async fn verify_did_needs_the_provider_username() {
    let runner = Arc::new(ScriptedRunner::succeeding_with("unreachable"));
    let (_dir, artifacts) = temp_artifacts();
    let orchestrator = StepOrchestrator::new(runner, artifacts);

    let store = SessionStore::new();
    let (_, session) = store.create(); // no config at all

    let err = orchestrator
        .execute(&session, Step::VerifyDid, &HashMap::new())
        .await
        .expect_err("username is required");
    assert!(matches!(
        err,
        WorkflowError::MissingConfig {
            key: "TDP_USERNAME",
            ..
        }
    ));
}
