//! # Test Helpers
//!
//! In-process fakes for the external collaborators, shared by unit and
//! integration tests.
//!
//! - [`MockDeploymentGateway`]: hands out sequential task ids (`t1`, `t2`, ...) and
//!   reports whatever state a test assigns to each task
//! - [`FaultyLedger`]: an [`InMemoryLedger`] whose reads and writes can be made to fail
//! - [`RecordingScheduler`]: records schedule calls and can be told to fail

use crate::backup::{BackupError, BackupResult, BackupScheduler, BackupTarget, ScheduleKey};
use crate::catalog::{Plan, PlanCatalog, Service};
use crate::gateway::{
    DeploymentGateway, EnvironmentInfo, GatewayError, GatewayResult, Task, TaskId,
};
use crate::ledger::{InMemoryLedger, LedgerError, LedgerResult, OperationLedger, OperationRecord};
use crate::state_machine::TaskState;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DIRECTOR_UUID: &str = "director-uuid-1";

/// Which gateway call a mock should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    EnvironmentInfo,
    SubmitDeployment,
    SubmitTeardown,
    PollTask,
}

#[derive(Debug, Default)]
struct GatewayState {
    next_task: u64,
    tasks: HashMap<TaskId, TaskState>,
    deployments: Vec<String>,
    teardowns: Vec<String>,
    failures: HashMap<GatewayCall, GatewayError>,
}

#[derive(Debug, Default)]
pub struct MockDeploymentGateway {
    state: Mutex<GatewayState>,
}

impl MockDeploymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state `poll_task` reports for a task
    pub fn set_task_state(&self, task_id: &str, state: TaskState) {
        self.state.lock().tasks.insert(TaskId::from(task_id), state);
    }

    pub fn fail(&self, call: GatewayCall, error: GatewayError) {
        self.state.lock().failures.insert(call, error);
    }

    pub fn recover(&self, call: GatewayCall) {
        self.state.lock().failures.remove(&call);
    }

    /// Manifests submitted so far, in order
    pub fn deployments(&self) -> Vec<String> {
        self.state.lock().deployments.clone()
    }

    /// Deployment names torn down so far, in order
    pub fn teardowns(&self) -> Vec<String> {
        self.state.lock().teardowns.clone()
    }

    fn check(&self, call: GatewayCall) -> GatewayResult<()> {
        match self.state.lock().failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn issue_task(state: &mut GatewayState) -> TaskId {
        state.next_task += 1;
        let task_id = TaskId::new(format!("t{}", state.next_task));
        state
            .tasks
            .insert(task_id.clone(), TaskState::Running("queued".to_string()));
        task_id
    }
}

#[async_trait]
impl DeploymentGateway for MockDeploymentGateway {
    async fn environment_info(&self) -> GatewayResult<EnvironmentInfo> {
        self.check(GatewayCall::EnvironmentInfo)?;
        Ok(EnvironmentInfo {
            uuid: DIRECTOR_UUID.to_string(),
            name: "mock-director".to_string(),
            version: "0.0.0".to_string(),
        })
    }

    async fn submit_deployment(&self, manifest: &str) -> GatewayResult<TaskId> {
        self.check(GatewayCall::SubmitDeployment)?;
        let mut state = self.state.lock();
        state.deployments.push(manifest.to_string());
        Ok(Self::issue_task(&mut state))
    }

    async fn submit_teardown(&self, deployment: &str) -> GatewayResult<TaskId> {
        self.check(GatewayCall::SubmitTeardown)?;
        let mut state = self.state.lock();
        state.teardowns.push(deployment.to_string());
        Ok(Self::issue_task(&mut state))
    }

    async fn poll_task(&self, task_id: &TaskId) -> GatewayResult<Task> {
        self.check(GatewayCall::PollTask)?;
        let state = self.state.lock();
        let task_state = state.tasks.get(task_id).cloned().ok_or_else(|| GatewayError::NotFound {
            what: format!("task {task_id}"),
        })?;
        Ok(Task {
            id: task_id.clone(),
            state: task_state,
            description: Some(format!("mock task {task_id}")),
        })
    }
}

#[derive(Debug, Default)]
pub struct FaultyLedger {
    inner: InMemoryLedger,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl FaultyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl OperationLedger for FaultyLedger {
    async fn put(&self, instance_id: &str, record: &OperationRecord) -> LedgerResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::unavailable("vault is sealed"));
        }
        self.inner.put(instance_id, record).await
    }

    async fn get(&self, instance_id: &str) -> LedgerResult<Option<OperationRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::unavailable("vault is sealed"));
        }
        self.inner.get(instance_id).await
    }

    async fn delete(&self, instance_id: &str) -> LedgerResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::unavailable("vault is sealed"));
        }
        self.inner.delete(instance_id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleCall {
    Create(ScheduleKey),
    Delete(ScheduleKey),
}

#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<ScheduleCall>>,
    failure: Mutex<Option<BackupError>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following call with `error`
    pub fn fail_with(&self, error: BackupError) {
        *self.failure.lock() = Some(error);
    }

    pub fn calls(&self) -> Vec<ScheduleCall> {
        self.calls.lock().clone()
    }

    fn check(&self) -> BackupResult<()> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BackupScheduler for RecordingScheduler {
    async fn create_schedule(&self, key: &ScheduleKey, _target: &BackupTarget) -> BackupResult<()> {
        self.calls.lock().push(ScheduleCall::Create(key.clone()));
        self.check()
    }

    async fn delete_schedule(&self, key: &ScheduleKey) -> BackupResult<()> {
        self.calls.lock().push(ScheduleCall::Delete(key.clone()));
        self.check()
    }
}

/// A one-plan catalog: service `s1` with plan `p1` named `small`.
///
/// The credentials template renders to `{"host": "small-<instance>.internal", "port": 6379}`.
pub fn sample_plan(backup: Option<BackupTarget>) -> Plan {
    let Value::Object(parameters) = json!({"port": 6379}) else {
        unreachable!()
    };
    Plan {
        id: "p1".to_string(),
        name: "small".to_string(),
        description: "A small instance".to_string(),
        manifest: json!({
            "name": "(( name ))",
            "director_uuid": "(( director_uuid ))",
            "instance_groups": [{"name": "redis", "instances": 1}],
            "properties": {"port": "(( port ))"}
        }),
        credentials: json!({
            "host": "(( name )).internal",
            "port": "(( port ))"
        }),
        parameters,
        backup,
    }
}

pub fn sample_catalog(backup: Option<BackupTarget>) -> PlanCatalog {
    let service = Service {
        id: "s1".to_string(),
        name: "redis".to_string(),
        description: "Redis on demand".to_string(),
        bindable: true,
        tags: vec!["redis".to_string()],
        plans: vec![sample_plan(backup)],
    };
    PlanCatalog::from_services(vec![service]).unwrap_or_default()
}

/// Parameters map from a JSON object literal
pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
