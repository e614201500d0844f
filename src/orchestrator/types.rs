use crate::ledger::OperationRecord;
use crate::state_machine::LastOperationState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionDetails {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionDetails {
    pub service_id: String,
    pub plan_id: String,
}

/// Binding request; only the instance id matters, the rest is accepted and ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindDetails {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbindDetails {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub service_id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvisionedServiceSpec {
    pub is_async: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IsAsync(pub bool);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    /// Credentials captured at provision time; absent while no provision record exists
    pub credentials: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastOperation {
    pub state: LastOperationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A reconciled poll together with the record it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct PolledOperation {
    pub last_operation: LastOperation,
    pub record: OperationRecord,
    /// Whether the record was removed from the ledger by this poll
    pub record_cleared: bool,
}
