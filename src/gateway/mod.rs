//! # Deployment Gateway
//!
//! Thin seam over the deployment orchestrator (a BOSH director). Every call is a
//! single network round trip; no retries happen at this layer.

pub mod bosh;

use crate::state_machine::TaskState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use bosh::BoshGateway;

/// Opaque handle of an asynchronous deployment task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Director metadata needed to template a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Deployment backend unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("Deployment backend rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid response from deployment backend: {reason}")]
    InvalidResponse { reason: String },
}

impl GatewayError {
    pub fn unavailable(reason: impl ToString) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn invalid_response(reason: impl ToString) -> Self {
        Self::InvalidResponse {
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::invalid_response(err)
        } else {
            Self::unavailable(err)
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait DeploymentGateway: Send + Sync {
    async fn environment_info(&self) -> GatewayResult<EnvironmentInfo>;

    /// Submit a rendered manifest; returns the task tracking the deploy
    async fn submit_deployment(&self, manifest: &str) -> GatewayResult<TaskId>;

    /// Submit deletion of the named deployment; returns the task tracking the teardown
    async fn submit_teardown(&self, deployment: &str) -> GatewayResult<TaskId>;

    async fn poll_task(&self, task_id: &TaskId) -> GatewayResult<Task>;
}
