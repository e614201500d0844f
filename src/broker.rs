//! # Service Broker
//!
//! Protocol-facing composition of the plan catalog, the [`LifecycleOrchestrator`] and
//! backup scheduling. Every lifecycle call is delegated to the orchestrator; the broker
//! adds schedule registration after an accepted provision and schedule removal once a
//! deprovision is observed to have succeeded.

use crate::backup::{deregister_schedule, register_schedule, BackupScheduler, ScheduleKey};
use crate::catalog::{CatalogService, PlanCatalog};
use crate::config::{BrokerConfig, ShieldConfig};
use crate::error::{BrokerError, BrokerResult};
use crate::gateway::DeploymentGateway;
use crate::ledger::{OperationLedger, OperationRecord};
use crate::orchestrator::{
    BindDetails, Binding, DeprovisionDetails, IsAsync, LastOperation, LifecycleOrchestrator,
    ProvisionDetails, ProvisionedServiceSpec, UnbindDetails, UpdateDetails,
};
use crate::state_machine::{LastOperationState, OperationKind};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ServiceBroker {
    name: String,
    orchestrator: LifecycleOrchestrator,
    scheduler: Arc<dyn BackupScheduler>,
    /// Decides which services get backup schedules
    backups: ShieldConfig,
}

impl std::fmt::Debug for ServiceBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBroker")
            .field("name", &self.name)
            .field("orchestrator", &self.orchestrator)
            .field("backups", &self.backups.enabled)
            .field("backup_services", &self.backups.enabled_on_targets)
            .finish()
    }
}

impl ServiceBroker {
    pub fn new(orchestrator: LifecycleOrchestrator, scheduler: Arc<dyn BackupScheduler>) -> Self {
        Self {
            name: "blacksmith".to_string(),
            orchestrator,
            scheduler,
            backups: ShieldConfig {
                enabled: true,
                ..ShieldConfig::default()
            },
        }
    }

    /// Wire a broker from loaded configuration and already-constructed collaborators
    pub fn from_config(
        config: &BrokerConfig,
        catalog: PlanCatalog,
        gateway: Arc<dyn DeploymentGateway>,
        ledger: Arc<dyn OperationLedger>,
        scheduler: Arc<dyn BackupScheduler>,
    ) -> Self {
        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(catalog),
            gateway,
            ledger,
            config.logging.clone(),
        )
        .with_instance_serialization(config.broker.serialize_instances);

        info!(
            broker = %config.broker.name,
            plans = orchestrator.catalog().len(),
            backups = config.shield.enabled,
            "Service broker ready"
        );

        Self {
            name: config.broker.name.clone(),
            orchestrator,
            scheduler,
            backups: config.shield.clone(),
        }
    }

    /// Restrict backup schedules to these service ids; empty means every service
    pub fn with_backup_services(mut self, services: Vec<String>) -> Self {
        self.backups.enabled_on_targets = services;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.orchestrator
    }

    /// The service catalog advertised to the platform
    pub fn services(&self) -> &[CatalogService] {
        self.orchestrator.catalog().services()
    }

    /// Provision the instance and, when its plan defines a backup target, register
    /// its backup schedule. A schedule failure is returned even though the
    /// deployment was accepted.
    pub async fn provision(
        &self,
        instance_id: &str,
        details: &ProvisionDetails,
    ) -> BrokerResult<ProvisionedServiceSpec> {
        let spec = self.orchestrator.provision(instance_id, details).await?;

        let plan = self
            .orchestrator
            .catalog()
            .lookup(&details.service_id, &details.plan_id)?;
        match &plan.backup {
            Some(target) if self.backups.covers_service(&details.service_id) => {
                let key = ScheduleKey::new(&details.service_id, &details.plan_id, instance_id);
                register_schedule(self.scheduler.as_ref(), &key, target).await?;
            }
            _ => debug!(instance_id = %instance_id, "No backup schedule for this plan"),
        }

        Ok(spec)
    }

    pub async fn deprovision(
        &self,
        instance_id: &str,
        details: &DeprovisionDetails,
    ) -> BrokerResult<IsAsync> {
        self.orchestrator.deprovision(instance_id, details).await
    }

    pub async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: &BindDetails,
    ) -> BrokerResult<Binding> {
        self.orchestrator.bind(instance_id, binding_id, details).await
    }

    pub async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: &UnbindDetails,
    ) -> BrokerResult<()> {
        self.orchestrator.unbind(instance_id, binding_id, details).await
    }

    pub async fn update(&self, instance_id: &str, details: &UpdateDetails) -> BrokerResult<IsAsync> {
        self.orchestrator.update(instance_id, details).await
    }

    /// Report the last operation; a deprovision reported as succeeded also removes
    /// the instance's backup schedule. Removal failures are logged, not returned.
    pub async fn last_operation(&self, instance_id: &str) -> BrokerResult<LastOperation> {
        let polled = self.orchestrator.poll(instance_id).await?;

        if polled.record.kind == OperationKind::Deprovision
            && polled.last_operation.state == LastOperationState::Succeeded
            && polled.record_cleared
        {
            if let Err(e) = self.remove_schedule(instance_id, &polled.record).await {
                warn!(
                    instance_id = %instance_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Failed to remove backup schedule after deprovision"
                );
            }
        }

        Ok(polled.last_operation)
    }

    async fn remove_schedule(&self, instance_id: &str, record: &OperationRecord) -> BrokerResult<()> {
        let plan_key = record.plan_key();
        if plan_key.service_id.is_empty() || !self.backups.covers_service(&plan_key.service_id) {
            return Ok(());
        }

        match self
            .orchestrator
            .catalog()
            .lookup(&plan_key.service_id, &plan_key.plan_id)
        {
            Ok(plan) if plan.backup.is_none() => return Ok(()),
            Ok(_) => {}
            // Plan removed from the catalog since provisioning; the schedule may still exist.
            Err(BrokerError::PlanNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let key = ScheduleKey::new(&plan_key.service_id, &plan_key.plan_id, instance_id);
        deregister_schedule(self.scheduler.as_ref(), &key).await
    }
}
