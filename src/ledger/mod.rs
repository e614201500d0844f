//! # Operation Ledger
//!
//! Durable `instance id -> last operation` records. The ledger holds the only state
//! the broker keeps about an instance, so everything the orchestrator needs after a
//! restart must be in the [`OperationRecord`].

pub mod memory;
pub mod vault;

use crate::catalog::PlanKey;
use crate::gateway::TaskId;
use crate::state_machine::OperationKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryLedger;
pub use vault::VaultLedger;

/// The single current operation for an instance. Writing a new record replaces
/// whatever was there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub task_id: TaskId,
    /// Generated once while rendering the provision manifest; never recomputed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    /// Name of the BOSH deployment backing the instance
    #[serde(default)]
    pub deployment: String,
}

impl OperationRecord {
    pub fn provision(task_id: TaskId, credentials: Value, key: &PlanKey, deployment: &str) -> Self {
        Self {
            kind: OperationKind::Provision,
            task_id,
            credentials: Some(credentials),
            service_id: key.service_id.clone(),
            plan_id: key.plan_id.clone(),
            deployment: deployment.to_string(),
        }
    }

    pub fn deprovision(task_id: TaskId, key: &PlanKey, deployment: &str) -> Self {
        Self {
            kind: OperationKind::Deprovision,
            task_id,
            credentials: None,
            service_id: key.service_id.clone(),
            plan_id: key.plan_id.clone(),
            deployment: deployment.to_string(),
        }
    }

    pub fn plan_key(&self) -> PlanKey {
        PlanKey::new(&self.service_id, &self.plan_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Secret store unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("Secret store rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Stored operation for {instance_id} is unreadable: {reason}")]
    Corrupt { instance_id: String, reason: String },
}

impl LedgerError {
    pub fn unavailable(reason: impl ToString) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        Self::unavailable(err)
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[async_trait]
pub trait OperationLedger: Send + Sync {
    async fn put(&self, instance_id: &str, record: &OperationRecord) -> LedgerResult<()>;

    /// `Ok(None)` when the instance has no record
    async fn get(&self, instance_id: &str) -> LedgerResult<Option<OperationRecord>>;

    /// Deleting a missing record succeeds
    async fn delete(&self, instance_id: &str) -> LedgerResult<()>;
}
