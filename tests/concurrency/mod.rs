//! Concurrent lifecycle calls, with and without per-instance serialization.

use async_trait::async_trait;
use blacksmith_core::gateway::{DeploymentGateway, EnvironmentInfo, GatewayResult, Task, TaskId};
use blacksmith_core::ledger::{InMemoryLedger, OperationLedger};
use blacksmith_core::logging::LoggingConfig;
use blacksmith_core::orchestrator::{DeprovisionDetails, ProvisionDetails};
use blacksmith_core::test_helpers::{params, sample_catalog, MockDeploymentGateway};
use blacksmith_core::LifecycleOrchestrator;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps the mock gateway and tracks how many submissions overlap in time
#[derive(Default)]
struct OverlapGateway {
    inner: MockDeploymentGateway,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl OverlapGateway {
    async fn track<T>(&self, fut: impl std::future::Future<Output = T>) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let out = fut.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

#[async_trait]
impl DeploymentGateway for OverlapGateway {
    async fn environment_info(&self) -> GatewayResult<EnvironmentInfo> {
        self.inner.environment_info().await
    }

    async fn submit_deployment(&self, manifest: &str) -> GatewayResult<TaskId> {
        self.track(self.inner.submit_deployment(manifest)).await
    }

    async fn submit_teardown(&self, deployment: &str) -> GatewayResult<TaskId> {
        self.track(self.inner.submit_teardown(deployment)).await
    }

    async fn poll_task(&self, task_id: &TaskId) -> GatewayResult<Task> {
        self.inner.poll_task(task_id).await
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

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_instances_provision_concurrently() {
    let gateway = Arc::new(MockDeploymentGateway::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let orchestrator = Arc::new(LifecycleOrchestrator::new(
        Arc::new(sample_catalog(None)),
        gateway.clone(),
        ledger.clone(),
        LoggingConfig::default(),
    ));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .provision(&format!("i{i}"), &provision_details())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.len(), 20);
    let mut task_ids = HashSet::new();
    for i in 0..20 {
        let record = ledger.get(&format!("i{i}")).await.unwrap().unwrap();
        assert!(task_ids.insert(record.task_id));
    }
    assert_eq!(gateway.deployments().len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_instance_calls_do_not_overlap() {
    let gateway = Arc::new(OverlapGateway::default());
    let orchestrator = Arc::new(LifecycleOrchestrator::new(
        Arc::new(sample_catalog(None)),
        gateway.clone(),
        Arc::new(InMemoryLedger::new()),
        LoggingConfig::default(),
    ));

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if n % 2 == 0 {
                    orchestrator.provision("i1", &provision_details()).await.map(|_| ())
                } else {
                    orchestrator.deprovision("i1", &deprovision_details()).await.map(|_| ())
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialization_can_be_disabled() {
    let gateway = Arc::new(OverlapGateway::default());
    let orchestrator = Arc::new(
        LifecycleOrchestrator::new(
            Arc::new(sample_catalog(None)),
            gateway.clone(),
            Arc::new(InMemoryLedger::new()),
            LoggingConfig::default(),
        )
        .with_instance_serialization(false),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.provision("i1", &provision_details()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(gateway.inner.deployments().len(), 4);
}
