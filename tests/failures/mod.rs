//! Collaborator failures and how each lifecycle call surfaces them.

use blacksmith_core::gateway::GatewayError;
use blacksmith_core::ledger::OperationLedger;
use blacksmith_core::logging::LoggingConfig;
use blacksmith_core::manifest::{ManifestError, ManifestGenerator, ManifestResult, RenderedManifest};
use blacksmith_core::orchestrator::{BindDetails, DeprovisionDetails, ProvisionDetails};
use blacksmith_core::state_machine::{LastOperationState, OperationKind, TaskState};
use blacksmith_core::test_helpers::{
    params, sample_catalog, FaultyLedger, GatewayCall, MockDeploymentGateway,
};
use blacksmith_core::{BrokerError, LifecycleOrchestrator, Plan};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn setup() -> (LifecycleOrchestrator, Arc<MockDeploymentGateway>, Arc<FaultyLedger>) {
    let gateway = Arc::new(MockDeploymentGateway::new());
    let ledger = Arc::new(FaultyLedger::new());
    let orchestrator = LifecycleOrchestrator::new(
        Arc::new(sample_catalog(None)),
        gateway.clone(),
        ledger.clone(),
        LoggingConfig::default(),
    );
    (orchestrator, gateway, ledger)
}

fn provision_details() -> ProvisionDetails {
    ProvisionDetails {
        service_id: "s1".to_string(),
        plan_id: "p1".to_string(),
        parameters: params(json!({})),
    }
}

fn deprovision_details() -> DeprovisionDetails {
    DeprovisionDetails {
        service_id: "s1".to_string(),
        plan_id: "p1".to_string(),
    }
}

#[tokio::test]
async fn test_provision_ledger_failure_is_surfaced() {
    let (orchestrator, gateway, ledger) = setup();
    ledger.fail_writes(true);

    let err = orchestrator.provision("i1", &provision_details()).await.unwrap_err();
    assert!(matches!(err, BrokerError::LedgerWriteFailed { .. }));
    assert!(err.is_retryable());
    // The deployment was already submitted.
    assert_eq!(gateway.deployments().len(), 1);
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_deprovision_ledger_failure_is_tolerated() {
    let (orchestrator, gateway, ledger) = setup();
    orchestrator.provision("i1", &provision_details()).await.unwrap();
    ledger.fail_writes(true);

    let accepted = orchestrator.deprovision("i1", &deprovision_details()).await.unwrap();
    assert!(accepted.0);
    assert_eq!(gateway.teardowns(), vec!["small-i1".to_string()]);

    ledger.fail_writes(false);
    let record = ledger.get("i1").await.unwrap().unwrap();
    assert_eq!(record.kind, OperationKind::Provision);
}

#[tokio::test]
async fn test_environment_info_failure_is_backend_unavailable() {
    let (orchestrator, gateway, ledger) = setup();
    gateway.fail(
        GatewayCall::EnvironmentInfo,
        GatewayError::unavailable("connection refused"),
    );

    let err = orchestrator.provision("i1", &provision_details()).await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::BackendUnavailable { ref service, .. } if service == "bosh"
    ));
    assert!(gateway.deployments().is_empty());
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_rejected_deployment_writes_nothing() {
    let (orchestrator, gateway, ledger) = setup();
    gateway.fail(
        GatewayCall::SubmitDeployment,
        GatewayError::Rejected {
            status: 400,
            message: "bad manifest".to_string(),
        },
    );

    let err = orchestrator.provision("i1", &provision_details()).await.unwrap_err();
    assert!(matches!(err, BrokerError::BackendDeploymentFailed { .. }));
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_rejected_teardown_writes_nothing() {
    let (orchestrator, gateway, ledger) = setup();
    gateway.fail(
        GatewayCall::SubmitTeardown,
        GatewayError::Rejected {
            status: 500,
            message: "director busy".to_string(),
        },
    );

    let err = orchestrator.deprovision("i1", &deprovision_details()).await.unwrap_err();
    assert!(matches!(err, BrokerError::BackendDeploymentFailed { .. }));
    assert!(ledger.is_empty());

    gateway.recover(GatewayCall::SubmitTeardown);
    gateway.fail(GatewayCall::SubmitTeardown, GatewayError::unavailable("timeout"));
    let err = orchestrator.deprovision("i1", &deprovision_details()).await.unwrap_err();
    assert_eq!(err.kind(), "backend_unavailable");
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_poll_failure_is_unrecognized_task() {
    let (orchestrator, gateway, _ledger) = setup();
    orchestrator.provision("i1", &provision_details()).await.unwrap();
    gateway.fail(GatewayCall::PollTask, GatewayError::unavailable("timeout"));

    let err = orchestrator.last_operation("i1").await.unwrap_err();
    match err {
        BrokerError::UnrecognizedTask { task_id, .. } => assert_eq!(task_id.as_str(), "t1"),
        other => panic!("unexpected error: {other}"),
    }

    gateway.recover(GatewayCall::PollTask);
    gateway.set_task_state("t1", TaskState::Done);
    let op = orchestrator.last_operation("i1").await.unwrap();
    assert_eq!(op.state, LastOperationState::Succeeded);
}

#[tokio::test]
async fn test_ledger_read_failure_on_bind() {
    let (orchestrator, _gateway, ledger) = setup();
    orchestrator.provision("i1", &provision_details()).await.unwrap();
    ledger.fail_reads(true);

    let err = orchestrator
        .bind("i1", "b1", &BindDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BrokerError::BackendUnavailable { ref service, .. } if service == "vault"
    ));
}

#[tokio::test]
async fn test_deprovision_with_unreadable_ledger_submits_nothing() {
    let (orchestrator, gateway, ledger) = setup();
    orchestrator.provision("i1", &provision_details()).await.unwrap();
    ledger.fail_reads(true);

    let err = orchestrator.deprovision("i1", &deprovision_details()).await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::BackendUnavailable { ref service, .. } if service == "vault"
    ));
    assert!(gateway.teardowns().is_empty());

    ledger.fail_reads(false);
    let record = ledger.get("i1").await.unwrap().unwrap();
    assert_eq!(record.kind, OperationKind::Provision);
    assert_eq!(record.deployment, "small-i1");
}

#[tokio::test]
async fn test_unrecorded_provision_can_still_be_torn_down() {
    let (orchestrator, gateway, ledger) = setup();
    ledger.fail_writes(true);
    assert!(orchestrator.provision("i1", &provision_details()).await.is_err());
    ledger.fail_writes(false);

    orchestrator.deprovision("i1", &deprovision_details()).await.unwrap();
    assert_eq!(gateway.teardowns(), vec!["small-i1".to_string()]);
    let record = ledger.get("i1").await.unwrap().unwrap();
    assert_eq!(record.kind, OperationKind::Deprovision);
    assert_eq!(record.deployment, "small-i1");
}

#[tokio::test]
async fn test_failed_record_clear_is_retried_on_next_poll() {
    let (orchestrator, gateway, ledger) = setup();
    orchestrator.deprovision("i1", &deprovision_details()).await.unwrap();
    gateway.set_task_state("t1", TaskState::Done);

    ledger.fail_writes(true);
    let polled = orchestrator.poll("i1").await.unwrap();
    assert_eq!(polled.last_operation.state, LastOperationState::Succeeded);
    assert!(!polled.record_cleared);

    ledger.fail_writes(false);
    let polled = orchestrator.poll("i1").await.unwrap();
    assert!(polled.record_cleared);
    assert!(ledger.is_empty());
}

struct BrokenTemplates;

impl ManifestGenerator for BrokenTemplates {
    fn generate(&self, _plan: &Plan, _params: &Map<String, Value>) -> ManifestResult<RenderedManifest> {
        Err(ManifestError::UnknownParameter {
            name: "static_ips".to_string(),
        })
    }
}

#[tokio::test]
async fn test_manifest_failure_is_permanent() {
    let (orchestrator, gateway, ledger) = setup();
    let orchestrator = orchestrator.with_manifest_generator(Arc::new(BrokenTemplates));

    let err = orchestrator.provision("i1", &provision_details()).await.unwrap_err();
    assert!(matches!(err, BrokerError::ManifestGenerationFailed { .. }));
    assert!(!err.is_retryable());
    assert!(gateway.deployments().is_empty());
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_empty_instance_id_is_rejected() {
    let (orchestrator, gateway, _ledger) = setup();
    let err = orchestrator.provision("", &provision_details()).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_operation_state");
    assert!(gateway.deployments().is_empty());
}
