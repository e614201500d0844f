use serde::{Deserialize, Serialize};
use std::fmt;

/// Which lifecycle flow produced an operation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A deployment was submitted for a new instance
    Provision,
    /// A teardown was submitted for an existing instance
    Deprovision,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision => write!(f, "provision"),
            Self::Deprovision => write!(f, "deprovision"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision" => Ok(Self::Provision),
            "deprovision" => Ok(Self::Deprovision),
            _ => Err(format!("Invalid operation kind: {s}")),
        }
    }
}

/// Status of a deployment task as reported by the gateway.
///
/// Only `done` and `error` are terminal; every other state string the director
/// reports (`queued`, `processing`, `cancelling`, ...) is carried through
/// verbatim in `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskState {
    Done,
    Error,
    Running(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
            Self::Running(state) => write!(f, "{state}"),
        }
    }
}

impl From<&str> for TaskState {
    fn from(s: &str) -> Self {
        match s {
            "done" => Self::Done,
            "error" => Self::Error,
            other => Self::Running(other.to_string()),
        }
    }
}

impl Serialize for TaskState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// State reported to the protocol layer for the last operation on an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LastOperationState {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl LastOperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for LastOperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
