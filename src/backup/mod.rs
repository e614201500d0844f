//! # Backup Scheduling
//!
//! Registers and removes a periodic backup job per service instance. A schedule
//! consists of a backup *target* (what to back up, with plugin configuration) and a
//! *job* (when, where to store, how long to retain). Both are named from the
//! instance's [`ScheduleKey`].

pub mod shield;

use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

pub use shield::ShieldScheduler;

/// Typed plugin configuration, one variant per supported plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackupPlugin {
    RabbitmqBroker {
        rmq_url: String,
        rmq_username: String,
        rmq_password: String,
        #[serde(default)]
        skip_ssl_validation: bool,
    },
    Redis {
        host: String,
        #[serde(default = "default_redis_port")]
        port: u16,
        #[serde(default)]
        password: Option<String>,
    },
    Postgres {
        host: String,
        #[serde(default = "default_postgres_port")]
        port: u16,
        user: String,
        password: String,
        #[serde(default)]
        database: Option<String>,
    },
}

fn default_redis_port() -> u16 {
    6379
}

fn default_postgres_port() -> u16 {
    5432
}

impl BackupPlugin {
    /// Plugin identifier understood by the backup service
    pub fn plugin_name(&self) -> &'static str {
        match self {
            Self::RabbitmqBroker { .. } => "rabbitmq-broker",
            Self::Redis { .. } => "redis",
            Self::Postgres { .. } => "postgres",
        }
    }

    /// Plugin configuration in the key layout the plugin expects
    pub fn endpoint_config(&self) -> Value {
        match self {
            Self::RabbitmqBroker {
                rmq_url,
                rmq_username,
                rmq_password,
                skip_ssl_validation,
            } => json!({
                "rmq_url": rmq_url,
                "rmq_username": rmq_username,
                "rmq_password": rmq_password,
                "skip_ssl_validation": skip_ssl_validation,
            }),
            Self::Redis { host, port, password } => {
                let mut config = json!({"redis_host": host, "redis_port": port});
                if let Some(password) = password {
                    config["redis_password"] = json!(password);
                }
                config
            }
            Self::Postgres {
                host,
                port,
                user,
                password,
                database,
            } => {
                let mut config = json!({
                    "pg_host": host,
                    "pg_port": port,
                    "pg_user": user,
                    "pg_password": password,
                });
                if let Some(database) = database {
                    config["pg_database"] = json!(database);
                }
                config
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Bzip2,
    Gzip,
    None,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bzip2 => "bzip2",
            Self::Gzip => "gzip",
            Self::None => "none",
        }
    }
}

/// Backup target definition carried by a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTarget {
    pub plugin: BackupPlugin,
    #[serde(default)]
    pub compression: Compression,
}

/// Identity of one instance's backup schedule.
///
/// Names are built by joining escaped segments with `:`. Each segment has `%`
/// replaced by `%25` and `:` by `%3A` first, so the separator never occurs inside a
/// segment and distinct keys always produce distinct names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub service_id: String,
    pub plan_id: String,
    pub instance_id: String,
}

impl ScheduleKey {
    pub fn new(
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            instance_id: instance_id.into(),
        }
    }

    pub fn target_name(&self) -> String {
        self.name("targets")
    }

    pub fn job_name(&self) -> String {
        self.name("jobs")
    }

    fn name(&self, kind: &str) -> String {
        [kind, self.service_id.as_str(), self.plan_id.as_str(), self.instance_id.as_str()]
            .iter()
            .map(|segment| escape_segment(segment))
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackupError {
    #[error("Backup service unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("Backup service rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("No backup job named {name}")]
    NotFound { name: String },
}

impl BackupError {
    pub fn unavailable(reason: impl ToString) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        Self::unavailable(err)
    }
}

pub type BackupResult<T> = Result<T, BackupError>;

#[async_trait]
pub trait BackupScheduler: Send + Sync {
    /// Create target and job; succeeds without changes if the job already exists
    async fn create_schedule(&self, key: &ScheduleKey, target: &BackupTarget) -> BackupResult<()>;

    /// Look the job up by name, then delete the job and its target, in that order
    async fn delete_schedule(&self, key: &ScheduleKey) -> BackupResult<()>;
}

/// Scheduler used when backups are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

#[async_trait]
impl BackupScheduler for NoopScheduler {
    async fn create_schedule(&self, _key: &ScheduleKey, _target: &BackupTarget) -> BackupResult<()> {
        Ok(())
    }

    async fn delete_schedule(&self, _key: &ScheduleKey) -> BackupResult<()> {
        Ok(())
    }
}

/// Register the backup schedule for an instance, mapping failures to broker errors
pub async fn register_schedule(
    scheduler: &dyn BackupScheduler,
    key: &ScheduleKey,
    target: &BackupTarget,
) -> BrokerResult<()> {
    match scheduler.create_schedule(key, target).await {
        Ok(()) => {
            info!(instance_id = %key.instance_id, job = %key.job_name(), "Backup schedule registered");
            Ok(())
        }
        Err(BackupError::Unavailable { reason }) => {
            warn!(instance_id = %key.instance_id, reason = %reason, "Backup service unavailable");
            Err(BrokerError::backend_unavailable("shield", reason))
        }
        Err(err) => Err(BrokerError::ScheduleCreationFailed {
            instance_id: key.instance_id.clone(),
            reason: err.to_string(),
        }),
    }
}

/// Remove the backup schedule for an instance, mapping failures to broker errors
pub async fn deregister_schedule(scheduler: &dyn BackupScheduler, key: &ScheduleKey) -> BrokerResult<()> {
    match scheduler.delete_schedule(key).await {
        Ok(()) => {
            info!(instance_id = %key.instance_id, job = %key.job_name(), "Backup schedule removed");
            Ok(())
        }
        Err(BackupError::NotFound { name }) => Err(BrokerError::ScheduleNotFound { name }),
        Err(err) => Err(BrokerError::ScheduleDeletionFailed {
            name: key.job_name(),
            reason: err.to_string(),
        }),
    }
}
