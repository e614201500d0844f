//! # Lifecycle Orchestrator
//!
//! Implements provision, deprovision, bind, unbind, update and last-operation for
//! service instances. The orchestrator keeps no state of its own: everything it
//! knows about an instance comes from the [`OperationLedger`] and the deployment
//! gateway's task records, so a restarted broker picks up exactly where it left off.
//!
//! ## Ordering
//!
//! Within provision and deprovision the ledger write happens only after the gateway
//! accepted the submission, so the ledger never holds a task id that was not
//! actually submitted. No call retries internally.
//!
//! ## Ledger write failures
//!
//! A failed write after a provision submission is returned to the caller
//! (`LedgerWriteFailed`) even though the deployment is already running. After a
//! teardown submission the same failure is only logged and the deprovision is
//! still accepted.

pub mod locks;
pub mod types;

use crate::catalog::{Plan, PlanCatalog, PlanKey};
use crate::error::{BrokerError, BrokerResult};
use crate::gateway::{DeploymentGateway, GatewayError};
use crate::ledger::{LedgerError, OperationLedger, OperationRecord};
use crate::logging::{log_lifecycle_error, log_lifecycle_operation, LoggingConfig};
use crate::manifest::{ManifestGenerator, TemplateManifestGenerator};
use crate::state_machine::{reconcile, OperationKind};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub use locks::{InstanceGuard, InstanceLocks};
pub use types::{
    BindDetails, Binding, DeprovisionDetails, IsAsync, LastOperation, PolledOperation,
    ProvisionDetails, ProvisionedServiceSpec, UnbindDetails, UpdateDetails,
};

const GATEWAY_SERVICE: &str = "bosh";
const LEDGER_SERVICE: &str = "vault";

pub struct LifecycleOrchestrator {
    catalog: Arc<PlanCatalog>,
    gateway: Arc<dyn DeploymentGateway>,
    ledger: Arc<dyn OperationLedger>,
    manifests: Arc<dyn ManifestGenerator>,
    locks: Option<InstanceLocks>,
    logging: LoggingConfig,
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("plans", &self.catalog.len())
            .field("serialize_instances", &self.locks.is_some())
            .field("debug", &self.logging.debug)
            .finish()
    }
}

impl LifecycleOrchestrator {
    /// Create an orchestrator with the template manifest generator and per-instance
    /// serialization enabled
    pub fn new(
        catalog: Arc<PlanCatalog>,
        gateway: Arc<dyn DeploymentGateway>,
        ledger: Arc<dyn OperationLedger>,
        logging: LoggingConfig,
    ) -> Self {
        Self {
            catalog,
            gateway,
            ledger,
            manifests: Arc::new(TemplateManifestGenerator),
            locks: Some(InstanceLocks::new()),
            logging,
        }
    }

    pub fn with_manifest_generator(mut self, manifests: Arc<dyn ManifestGenerator>) -> Self {
        self.manifests = manifests;
        self
    }

    /// Turn in-process serialization of calls per instance id on or off. Leave it
    /// on unless the caller already guarantees one call at a time per instance.
    pub fn with_instance_serialization(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(InstanceLocks::new);
        self
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    async fn lock_instance(&self, instance_id: &str) -> Option<InstanceGuard<'_>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(instance_id).await),
            None => None,
        }
    }

    /// Submit a deployment for a new instance and record it.
    ///
    /// Returns as soon as the deployment is accepted; completion is observed
    /// through [`last_operation`](Self::last_operation).
    #[instrument(skip(self, details), fields(correlation_id = %uuid::Uuid::new_v4(), service_id = %details.service_id, plan_id = %details.plan_id))]
    pub async fn provision(
        &self,
        instance_id: &str,
        details: &ProvisionDetails,
    ) -> BrokerResult<ProvisionedServiceSpec> {
        require_instance_id(instance_id)?;
        let _guard = self.lock_instance(instance_id).await;
        log_lifecycle_operation("provision", instance_id, "started", None);

        let result = self.provision_inner(instance_id, details).await;
        match &result {
            Ok(_) => log_lifecycle_operation("provision", instance_id, "accepted", None),
            Err(e) => log_lifecycle_error("provision", instance_id, e.kind(), &e.to_string()),
        }
        result
    }

    async fn provision_inner(
        &self,
        instance_id: &str,
        details: &ProvisionDetails,
    ) -> BrokerResult<ProvisionedServiceSpec> {
        let plan = self.catalog.lookup(&details.service_id, &details.plan_id)?;
        let key = PlanKey::new(&details.service_id, &details.plan_id);

        let info = self
            .gateway
            .environment_info()
            .await
            .map_err(|e| BrokerError::backend_unavailable(GATEWAY_SERVICE, e))?;

        let params = manifest_parameters(&plan, instance_id, &info.uuid, &details.parameters);
        let rendered = self
            .manifests
            .generate(&plan, &params)
            .map_err(|e| BrokerError::manifest_generation_failed(instance_id, e))?;

        if self.logging.debug {
            debug!(deployment = %rendered.deployment, manifest = %rendered.manifest, "Generated deployment manifest");
        }

        let task_id = self
            .gateway
            .submit_deployment(&rendered.manifest)
            .await
            .map_err(|e| BrokerError::backend_deployment_failed(instance_id, e))?;
        info!(task_id = %task_id, deployment = %rendered.deployment, "Deployment submitted");

        let record =
            OperationRecord::provision(task_id, rendered.credentials, &key, &rendered.deployment);
        self.ledger
            .put(instance_id, &record)
            .await
            .map_err(|e| BrokerError::ledger_write_failed(instance_id, e))?;

        Ok(ProvisionedServiceSpec { is_async: true })
    }

    /// Submit a teardown of the instance's deployment and record it.
    ///
    /// A missing prior record is not an error; the teardown then targets the name
    /// provisioning would have given the deployment under the requested plan. An
    /// unreadable ledger fails the call before anything is submitted.
    #[instrument(skip(self, details), fields(correlation_id = %uuid::Uuid::new_v4(), service_id = %details.service_id, plan_id = %details.plan_id))]
    pub async fn deprovision(
        &self,
        instance_id: &str,
        details: &DeprovisionDetails,
    ) -> BrokerResult<IsAsync> {
        require_instance_id(instance_id)?;
        let _guard = self.lock_instance(instance_id).await;
        log_lifecycle_operation("deprovision", instance_id, "started", None);

        let deployment = match self.deployment_name(instance_id, details).await {
            Ok(deployment) => deployment,
            Err(err) => {
                log_lifecycle_error("deprovision", instance_id, err.kind(), &err.to_string());
                return Err(err);
            }
        };
        let key = PlanKey::new(&details.service_id, &details.plan_id);

        let task_id = match self.gateway.submit_teardown(&deployment).await {
            Ok(task_id) => task_id,
            Err(e) => {
                let err = match e {
                    GatewayError::Unavailable { .. } => {
                        BrokerError::backend_unavailable(GATEWAY_SERVICE, e)
                    }
                    other => BrokerError::backend_deployment_failed(instance_id, other),
                };
                log_lifecycle_error("deprovision", instance_id, err.kind(), &err.to_string());
                return Err(err);
            }
        };
        info!(task_id = %task_id, deployment = %deployment, "Teardown submitted");

        let record = OperationRecord::deprovision(task_id, &key, &deployment);
        if let Err(e) = self.ledger.put(instance_id, &record).await {
            warn!(
                instance_id = %instance_id,
                task_id = %record.task_id,
                error = %e,
                "Failed to record teardown"
            );
        }

        log_lifecycle_operation("deprovision", instance_id, "accepted", None);
        Ok(IsAsync(true))
    }

    async fn deployment_name(
        &self,
        instance_id: &str,
        details: &DeprovisionDetails,
    ) -> BrokerResult<String> {
        let record = match self.ledger.get(instance_id).await {
            Ok(record) => record,
            Err(e @ LedgerError::Corrupt { .. }) => {
                warn!(instance_id = %instance_id, error = %e, "Ignoring unreadable operation record");
                None
            }
            Err(e) => return Err(BrokerError::backend_unavailable(LEDGER_SERVICE, e)),
        };
        if let Some(record) = record.filter(|r| !r.deployment.is_empty()) {
            return Ok(record.deployment);
        }

        match self.catalog.lookup(&details.service_id, &details.plan_id) {
            Ok(plan) => Ok(default_deployment_name(&plan, instance_id)),
            Err(_) => {
                warn!(
                    instance_id = %instance_id,
                    service_id = %details.service_id,
                    plan_id = %details.plan_id,
                    "No operation record and unknown plan; tearing down by instance id"
                );
                Ok(instance_id.to_string())
            }
        }
    }

    /// Return the credentials captured at provision time, verbatim.
    ///
    /// Binding before provisioning completes is allowed; the record then carries
    /// whatever credentials were rendered at submission.
    #[instrument(skip(self, _details), fields(correlation_id = %uuid::Uuid::new_v4()))]
    pub async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _details: &BindDetails,
    ) -> BrokerResult<Binding> {
        require_instance_id(instance_id)?;
        let record = self
            .ledger
            .get(instance_id)
            .await
            .map_err(|e| ledger_read_error(instance_id, e))?
            .ok_or_else(|| BrokerError::instance_not_found(instance_id))?;

        info!(instance_id = %instance_id, binding_id = %binding_id, kind = %record.kind, "Binding service");
        Ok(Binding {
            credentials: record.credentials,
        })
    }

    /// No credentials are revoked on unbind
    pub async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _details: &UnbindDetails,
    ) -> BrokerResult<()> {
        debug!(instance_id = %instance_id, binding_id = %binding_id, "Unbinding service");
        Ok(())
    }

    pub async fn update(&self, instance_id: &str, details: &UpdateDetails) -> BrokerResult<IsAsync> {
        debug!(instance_id = %instance_id, service_id = %details.service_id, "Rejecting update");
        Err(BrokerError::not_supported("update"))
    }

    /// Report the state of the instance's last operation
    pub async fn last_operation(&self, instance_id: &str) -> BrokerResult<LastOperation> {
        self.poll(instance_id).await.map(|polled| polled.last_operation)
    }

    /// Poll the recorded task and classify it, clearing consumed deprovision records.
    ///
    /// Never submits work to the gateway.
    #[instrument(skip(self), fields(correlation_id = %uuid::Uuid::new_v4()))]
    pub async fn poll(&self, instance_id: &str) -> BrokerResult<PolledOperation> {
        require_instance_id(instance_id)?;
        let _guard = self.lock_instance(instance_id).await;

        let record = self
            .ledger
            .get(instance_id)
            .await
            .map_err(|e| ledger_read_error(instance_id, e))?
            .ok_or_else(|| {
                BrokerError::invalid_operation_state(instance_id, "no operation recorded")
            })?;

        let task = self.gateway.poll_task(&record.task_id).await.map_err(|e| {
            warn!(kind = %record.kind, task_id = %record.task_id, error = %e, "Failed to get task from deployment backend");
            BrokerError::UnrecognizedTask {
                instance_id: instance_id.to_string(),
                task_id: record.task_id.clone(),
                reason: e.to_string(),
            }
        })?;

        let outcome = reconcile(record.kind, &task.state);
        debug!(kind = %record.kind, task_id = %record.task_id, task_state = %task.state, state = %outcome.state, "Reconciled operation");

        let mut record_cleared = false;
        if outcome.clear_record {
            info!(instance_id = %instance_id, "Clearing operation record");
            match self.ledger.delete(instance_id).await {
                Ok(()) => record_cleared = true,
                // The record stays; the next poll reports the same terminal state and retries.
                Err(e) => warn!(instance_id = %instance_id, error = %e, "Failed to clear operation record"),
            }
        }

        if outcome.state.is_terminal() {
            log_lifecycle_operation(
                &record.kind.to_string(),
                instance_id,
                &outcome.state.to_string(),
                task.description.as_deref(),
            );
        }

        Ok(PolledOperation {
            last_operation: LastOperation {
                state: outcome.state,
                description: describe(record.kind, task.description),
            },
            record,
            record_cleared,
        })
    }
}

fn require_instance_id(instance_id: &str) -> BrokerResult<()> {
    if instance_id.trim().is_empty() {
        return Err(BrokerError::invalid_operation_state(
            instance_id,
            "instance id must not be empty",
        ));
    }
    Ok(())
}

fn ledger_read_error(instance_id: &str, err: LedgerError) -> BrokerError {
    match err {
        LedgerError::Corrupt { reason, .. } => BrokerError::invalid_operation_state(instance_id, reason),
        other => BrokerError::backend_unavailable(LEDGER_SERVICE, other),
    }
}

fn describe(kind: OperationKind, task_description: Option<String>) -> Option<String> {
    task_description.map(|d| format!("{kind}: {d}"))
}

fn default_deployment_name(plan: &Plan, instance_id: &str) -> String {
    format!("{}-{}", plan.name, instance_id)
}

/// Plan defaults, overlaid with caller parameters, overlaid with the values the
/// broker owns (`name`, `director_uuid`), which callers cannot override.
fn manifest_parameters(
    plan: &Plan,
    instance_id: &str,
    director_uuid: &str,
    caller: &Map<String, Value>,
) -> Map<String, Value> {
    let mut params = plan.parameters.clone();
    params.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
    params.insert(
        "name".to_string(),
        Value::String(default_deployment_name(plan, instance_id)),
    );
    params.insert(
        "director_uuid".to_string(),
        Value::String(director_uuid.to_string()),
    );
    params.insert(
        "instance_id".to_string(),
        Value::String(instance_id.to_string()),
    );
    params
}
