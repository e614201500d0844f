//! # Broker Error Types
//!
//! Every failure a lifecycle call can surface to the protocol layer is one of the
//! [`BrokerError`] kinds below. Collaborator errors (`LedgerError`, `GatewayError`,
//! `BackupError`) are mapped onto these kinds at the orchestrator boundary.

use crate::catalog::PlanKey;
use crate::gateway::TaskId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Plan not found: {key}")]
    PlanNotFound { key: PlanKey },

    #[error("Backend unavailable: {service} - {reason}")]
    BackendUnavailable { service: String, reason: String },

    #[error("Deployment manifest generation failed for {instance_id}: {reason}")]
    ManifestGenerationFailed { instance_id: String, reason: String },

    #[error("Backend deployment failed for {instance_id}: {reason}")]
    BackendDeploymentFailed { instance_id: String, reason: String },

    #[error("Failed to record operation for {instance_id}: {reason}")]
    LedgerWriteFailed { instance_id: String, reason: String },

    #[error("Service instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("Invalid operation state for {instance_id}: {reason}")]
    InvalidOperationState { instance_id: String, reason: String },

    #[error("Unrecognized backend task {task_id} for {instance_id}: {reason}")]
    UnrecognizedTask {
        instance_id: String,
        task_id: TaskId,
        reason: String,
    },

    #[error("Backup schedule creation failed for {instance_id}: {reason}")]
    ScheduleCreationFailed { instance_id: String, reason: String },

    #[error("Backup schedule not found: {name}")]
    ScheduleNotFound { name: String },

    #[error("Backup schedule deletion failed for {name}: {reason}")]
    ScheduleDeletionFailed { name: String, reason: String },

    #[error("Operation not supported: {operation}")]
    NotSupported { operation: String },
}

impl BrokerError {
    pub fn backend_unavailable(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::BackendUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn manifest_generation_failed(instance_id: &str, reason: impl ToString) -> Self {
        Self::ManifestGenerationFailed {
            instance_id: instance_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn backend_deployment_failed(instance_id: &str, reason: impl ToString) -> Self {
        Self::BackendDeploymentFailed {
            instance_id: instance_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn ledger_write_failed(instance_id: &str, reason: impl ToString) -> Self {
        Self::LedgerWriteFailed {
            instance_id: instance_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn instance_not_found(instance_id: &str) -> Self {
        Self::InstanceNotFound {
            instance_id: instance_id.to_string(),
        }
    }

    pub fn invalid_operation_state(instance_id: &str, reason: impl ToString) -> Self {
        Self::InvalidOperationState {
            instance_id: instance_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    ///
    /// Manifest generation failures are permanent for a given request, as are
    /// unknown plans and unsupported operations.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. }
                | Self::UnrecognizedTask { .. }
                | Self::LedgerWriteFailed { .. }
                | Self::BackendDeploymentFailed { .. }
                | Self::ScheduleCreationFailed { .. }
                | Self::ScheduleDeletionFailed { .. }
        )
    }

    /// Short machine-readable name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlanNotFound { .. } => "plan_not_found",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::ManifestGenerationFailed { .. } => "manifest_generation_failed",
            Self::BackendDeploymentFailed { .. } => "backend_deployment_failed",
            Self::LedgerWriteFailed { .. } => "ledger_write_failed",
            Self::InstanceNotFound { .. } => "instance_not_found",
            Self::InvalidOperationState { .. } => "invalid_operation_state",
            Self::UnrecognizedTask { .. } => "unrecognized_task",
            Self::ScheduleCreationFailed { .. } => "schedule_creation_failed",
            Self::ScheduleNotFound { .. } => "schedule_not_found",
            Self::ScheduleDeletionFailed { .. } => "schedule_deletion_failed",
            Self::NotSupported { .. } => "not_supported",
        }
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
