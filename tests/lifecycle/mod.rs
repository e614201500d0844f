//! Provision → poll → deprovision → poll, as the platform drives it.

use blacksmith_core::ledger::{InMemoryLedger, OperationLedger};
use blacksmith_core::logging::LoggingConfig;
use blacksmith_core::orchestrator::{
    BindDetails, DeprovisionDetails, ProvisionDetails, UnbindDetails, UpdateDetails,
};
use blacksmith_core::state_machine::{LastOperationState, OperationKind, TaskState};
use blacksmith_core::test_helpers::{params, sample_catalog, MockDeploymentGateway, DIRECTOR_UUID};
use blacksmith_core::{BrokerError, LifecycleOrchestrator};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    orchestrator: LifecycleOrchestrator,
    gateway: Arc<MockDeploymentGateway>,
    ledger: Arc<InMemoryLedger>,
}

fn harness() -> Harness {
    let gateway = Arc::new(MockDeploymentGateway::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let orchestrator = LifecycleOrchestrator::new(
        Arc::new(sample_catalog(None)),
        gateway.clone(),
        ledger.clone(),
        LoggingConfig::debug(),
    );
    Harness {
        orchestrator,
        gateway,
        ledger,
    }
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
async fn test_provision_then_poll_succeeds() {
    let h = harness();

    let spec = h.orchestrator.provision("i1", &provision_details()).await.unwrap();
    assert!(spec.is_async);

    let record = h.ledger.get("i1").await.unwrap().unwrap();
    assert_eq!(record.kind, OperationKind::Provision);
    assert_eq!(record.task_id.as_str(), "t1");
    assert_eq!(
        record.credentials,
        Some(json!({"host": "small-i1.internal", "port": 6379}))
    );
    assert_eq!(record.deployment, "small-i1");
    assert_eq!(h.ledger.len(), 1);

    let op = h.orchestrator.last_operation("i1").await.unwrap();
    assert_eq!(op.state, LastOperationState::InProgress);

    h.gateway.set_task_state("t1", TaskState::Done);
    let op = h.orchestrator.last_operation("i1").await.unwrap();
    assert_eq!(op.state, LastOperationState::Succeeded);

    // Provision records are kept after completion so bind keeps working.
    assert!(h.ledger.get("i1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_submitted_manifest_is_rendered() {
    let h = harness();
    let mut details = provision_details();
    details.parameters = params(json!({"port": 7000, "name": "ignored"}));

    h.orchestrator.provision("i1", &details).await.unwrap();

    let manifests = h.gateway.deployments();
    assert_eq!(manifests.len(), 1);
    let manifest: serde_yaml::Value = serde_yaml::from_str(&manifests[0]).unwrap();
    assert_eq!(manifest["name"].as_str(), Some("small-i1"));
    assert_eq!(manifest["director_uuid"].as_str(), Some(DIRECTOR_UUID));
    assert_eq!(manifest["properties"]["port"].as_u64(), Some(7000));
}

#[tokio::test]
async fn test_provision_failure_is_reported_failed() {
    let h = harness();
    h.orchestrator.provision("i1", &provision_details()).await.unwrap();

    h.gateway.set_task_state("t1", TaskState::Error);
    let op = h.orchestrator.last_operation("i1").await.unwrap();
    assert_eq!(op.state, LastOperationState::Failed);
    assert!(h.ledger.get("i1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_deprovision_error_clears_record() {
    let h = harness();
    h.orchestrator.provision("i1", &provision_details()).await.unwrap();
    h.gateway.set_task_state("t1", TaskState::Done);

    let accepted = h.orchestrator.deprovision("i1", &deprovision_details()).await.unwrap();
    assert!(accepted.0);

    let record = h.ledger.get("i1").await.unwrap().unwrap();
    assert_eq!(record.kind, OperationKind::Deprovision);
    assert_eq!(record.task_id.as_str(), "t2");
    assert_eq!(record.credentials, None);
    assert_eq!(h.gateway.teardowns(), vec!["small-i1".to_string()]);

    h.gateway.set_task_state("t2", TaskState::Error);
    let op = h.orchestrator.last_operation("i1").await.unwrap();
    assert_eq!(op.state, LastOperationState::Failed);
    assert!(h.ledger.get("i1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_deprovision_done_clears_record() {
    let h = harness();
    h.orchestrator.provision("i1", &provision_details()).await.unwrap();
    h.orchestrator.deprovision("i1", &deprovision_details()).await.unwrap();

    h.gateway.set_task_state("t2", TaskState::Running("processing".to_string()));
    let polled = h.orchestrator.poll("i1").await.unwrap();
    assert_eq!(polled.last_operation.state, LastOperationState::InProgress);
    assert!(!polled.record_cleared);

    h.gateway.set_task_state("t2", TaskState::Done);
    let polled = h.orchestrator.poll("i1").await.unwrap();
    assert_eq!(polled.last_operation.state, LastOperationState::Succeeded);
    assert!(polled.record_cleared);
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_last_operation_without_record_is_invalid() {
    let h = harness();
    let err = h.orchestrator.last_operation("i-unknown").await.unwrap_err();
    assert!(matches!(err, BrokerError::InvalidOperationState { .. }));
}

#[tokio::test]
async fn test_last_operation_after_cleared_deprovision_is_invalid() {
    let h = harness();
    h.orchestrator.deprovision("i1", &deprovision_details()).await.unwrap();
    h.gateway.set_task_state("t1", TaskState::Done);
    h.orchestrator.last_operation("i1").await.unwrap();

    let err = h.orchestrator.last_operation("i1").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_operation_state");
}

#[tokio::test]
async fn test_deprovision_without_prior_record() {
    let h = harness();
    let accepted = h.orchestrator.deprovision("i9", &deprovision_details()).await;
    tokio_test::assert_ok!(accepted);

    assert_eq!(h.gateway.teardowns(), vec!["small-i9".to_string()]);
    let record = h.ledger.get("i9").await.unwrap().unwrap();
    assert_eq!(record.kind, OperationKind::Deprovision);
    assert_eq!(record.task_id.as_str(), "t1");
    assert_eq!(record.deployment, "small-i9");
}

#[tokio::test]
async fn test_deprovision_unknown_plan_without_record_uses_instance_id() {
    let h = harness();
    let details = DeprovisionDetails {
        service_id: "s1".to_string(),
        plan_id: "retired".to_string(),
    };
    tokio_test::assert_ok!(h.orchestrator.deprovision("i9", &details).await);
    assert_eq!(h.gateway.teardowns(), vec!["i9".to_string()]);
}

#[tokio::test]
async fn test_bind_returns_same_credentials_every_time() {
    let h = harness();
    h.orchestrator.provision("i1", &provision_details()).await.unwrap();

    let first = h
        .orchestrator
        .bind("i1", "b1", &BindDetails::default())
        .await
        .unwrap();
    h.gateway.set_task_state("t1", TaskState::Done);
    h.orchestrator.last_operation("i1").await.unwrap();

    for binding in ["b2", "b3", "b4"] {
        let again = h
            .orchestrator
            .bind("i1", binding, &BindDetails::default())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_vec(&again.credentials).unwrap(),
            serde_json::to_vec(&first.credentials).unwrap()
        );
    }
}

#[tokio::test]
async fn test_bind_before_completion_is_allowed() {
    let h = harness();
    h.orchestrator.provision("i1", &provision_details()).await.unwrap();

    let binding = h
        .orchestrator
        .bind("i1", "b1", &BindDetails::default())
        .await
        .unwrap();
    assert!(binding.credentials.is_some());
}

#[tokio::test]
async fn test_bind_unknown_instance() {
    let h = harness();
    let err = h
        .orchestrator
        .bind("nope", "b1", &BindDetails::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BrokerError::InstanceNotFound {
            instance_id: "nope".to_string()
        }
    );
}

#[tokio::test]
async fn test_unbind_always_succeeds() {
    let h = harness();
    tokio_test::assert_ok!(
        h.orchestrator
            .unbind("never-provisioned", "b1", &UnbindDetails::default())
            .await
    );
}

#[tokio::test]
async fn test_update_is_not_supported() {
    let h = harness();
    h.orchestrator.provision("i1", &provision_details()).await.unwrap();

    for plan_id in [None, Some("p1".to_string()), Some("other".to_string())] {
        let details = UpdateDetails {
            service_id: "s1".to_string(),
            plan_id,
            parameters: params(json!({"port": 1})),
        };
        let err = h.orchestrator.update("i1", &details).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotSupported { .. }));
        assert!(!err.is_retryable());
    }
}

#[tokio::test]
async fn test_unknown_plan_submits_nothing() {
    let h = harness();
    let details = ProvisionDetails {
        service_id: "p1".to_string(),
        plan_id: "s1".to_string(),
        parameters: params(json!({})),
    };

    let err = h.orchestrator.provision("i1", &details).await.unwrap_err();
    assert!(matches!(err, BrokerError::PlanNotFound { .. }));
    assert!(h.gateway.deployments().is_empty());
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_lookup_is_stable() {
    let catalog = sample_catalog(None);
    let first = catalog.lookup("s1", "p1").unwrap();
    for _ in 0..10 {
        assert_eq!(catalog.lookup("s1", "p1").unwrap(), first);
    }
}
