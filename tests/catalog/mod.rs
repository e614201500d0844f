//! Catalog files on disk through to a provisioned instance.

use blacksmith_core::backup::BackupPlugin;
use blacksmith_core::ledger::{InMemoryLedger, OperationLedger};
use blacksmith_core::logging::LoggingConfig;
use blacksmith_core::orchestrator::ProvisionDetails;
use blacksmith_core::test_helpers::{params, MockDeploymentGateway, RecordingScheduler, ScheduleCall};
use blacksmith_core::{LifecycleOrchestrator, PlanCatalog, ServiceBroker};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const REDIS: &str = r#"
services:
  - id: redis
    name: redis
    description: Dedicated Redis
    tags: [redis, cache]
    plans:
      - id: standalone
        name: standalone
        description: Single node
        parameters:
          maxmemory: 256mb
        manifest:
          name: "(( name ))"
          director_uuid: "(( director_uuid ))"
          instance_groups:
            - name: redis
              instances: 1
              properties:
                maxmemory: "(( maxmemory ))"
        credentials:
          host: "(( name )).redis.internal"
          port: 6379
        backup:
          plugin:
            type: redis
            host: 10.244.0.12
"#;

const RABBITMQ: &str = r#"
services:
  - id: rabbitmq
    name: rabbitmq
    bindable: false
    plans:
      - id: single
        name: single
        manifest:
          name: "(( name ))"
"#;

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".yml").unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_catalog_merges_files() {
    let redis = write_file(REDIS);
    let rabbit = write_file(RABBITMQ);

    let catalog = PlanCatalog::load(&[redis.path(), rabbit.path()]).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.services().len(), 2);
    assert!(!catalog.services()[1].bindable);

    let plan = catalog.lookup("redis", "standalone").unwrap();
    match &plan.backup.as_ref().unwrap().plugin {
        BackupPlugin::Redis { port, .. } => assert_eq!(*port, 6379),
        other => panic!("unexpected plugin: {other:?}"),
    }
    assert!(catalog.lookup("standalone", "redis").is_err());
}

#[test]
fn test_duplicate_plans_across_files_rejected() {
    let first = write_file(RABBITMQ);
    let second = write_file(RABBITMQ);
    assert!(PlanCatalog::load(&[first.path(), second.path()]).is_err());
}

#[tokio::test]
async fn test_provision_from_loaded_catalog() {
    let file = write_file(REDIS);
    let catalog = PlanCatalog::load(&[file.path()]).unwrap();

    let gateway = Arc::new(MockDeploymentGateway::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let orchestrator = LifecycleOrchestrator::new(
        Arc::new(catalog),
        gateway.clone(),
        ledger.clone(),
        LoggingConfig::default(),
    );
    let broker = ServiceBroker::new(orchestrator, scheduler.clone());

    let details = ProvisionDetails {
        service_id: "redis".to_string(),
        plan_id: "standalone".to_string(),
        parameters: params(json!({"maxmemory": "1gb"})),
    };
    broker.provision("a1b2", &details).await.unwrap();

    let record = ledger.get("a1b2").await.unwrap().unwrap();
    assert_eq!(record.deployment, "standalone-a1b2");
    assert_eq!(
        record.credentials,
        Some(json!({"host": "standalone-a1b2.redis.internal", "port": 6379}))
    );
    let manifest: serde_yaml::Value = serde_yaml::from_str(&gateway.deployments()[0]).unwrap();
    assert_eq!(
        manifest["instance_groups"][0]["properties"]["maxmemory"].as_str(),
        Some("1gb")
    );
    assert_eq!(scheduler.calls().len(), 1);
    assert!(matches!(scheduler.calls()[0], ScheduleCall::Create(_)));
}
