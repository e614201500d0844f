//! # SHIELD Client
//!
//! HTTP implementation of [`BackupScheduler`] against the SHIELD v2 tenant API.

use super::{BackupError, BackupResult, BackupScheduler, BackupTarget, ScheduleKey};
use crate::config::{ConfigResult, ConfigurationError, ShieldConfig};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const TOKEN_HEADER: &str = "X-Shield-Token";
const MANAGED_SUMMARY: &str = "This resource is managed by Blacksmith.";

#[derive(Debug, Clone, Deserialize)]
struct ShieldTarget {
    uuid: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ShieldJob {
    uuid: String,
    name: String,
    #[serde(default)]
    target: Option<ShieldTarget>,
}

#[derive(Clone)]
pub struct ShieldScheduler {
    client: Client,
    base_url: Url,
    token: String,
    tenant_uuid: String,
    store_uuid: String,
    schedule: String,
    retain: String,
    retries: u32,
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for ShieldTarget {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ShieldJob {
    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ShieldScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShieldScheduler")
            .field("base_url", &self.base_url.as_str())
            .field("tenant_uuid", &self.tenant_uuid)
            .field("store_uuid", &self.store_uuid)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl ShieldScheduler {
    pub fn new(config: &ShieldConfig) -> ConfigResult<Self> {
        let base_url = Url::parse(&config.address).map_err(|e| {
            ConfigurationError::invalid_value("shield.address", config.address.clone(), e.to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(format!("blacksmith/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfigurationError::validation_error(format!("Failed to create SHIELD client: {e}"))
            })?;

        info!(base_url = %base_url, tenant = %config.tenant_uuid, "Created SHIELD client");

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            tenant_uuid: config.tenant_uuid.clone(),
            store_uuid: config.store_uuid.clone(),
            schedule: config.schedule.clone(),
            retain: config.retain.clone(),
            retries: config.retries,
        })
    }

    /// `/v2/tenants/<tenant>/<collection>[/<uuid>]`
    fn tenant_url(&self, collection: &str, uuid: Option<&str>) -> BackupResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackupError::unavailable("SHIELD URL cannot be a base"))?;
            segments
                .clear()
                .extend(["v2", "tenants", self.tenant_uuid.as_str(), collection]);
            if let Some(uuid) = uuid {
                segments.push(uuid);
            }
        }
        Ok(url)
    }

    fn target_request(&self, key: &ScheduleKey, target: &BackupTarget) -> Value {
        json!({
            "name": key.target_name(),
            "summary": MANAGED_SUMMARY,
            "plugin": target.plugin.plugin_name(),
            "compression": target.compression.as_str(),
            "config": target.plugin.endpoint_config(),
        })
    }

    fn job_request(&self, key: &ScheduleKey, target_uuid: &str) -> Value {
        json!({
            "name": key.job_name(),
            "summary": MANAGED_SUMMARY,
            "target": target_uuid,
            "store": self.store_uuid,
            "schedule": self.schedule,
            "retain": self.retain,
            "retries": self.retries,
            "paused": false,
        })
    }

    /// Look up a resource by exact name
    async fn find<T: DeserializeOwned + Named>(
        &self,
        collection: &str,
        name: &str,
    ) -> BackupResult<Option<T>> {
        let mut url = self.tenant_url(collection, None)?;
        url.query_pairs_mut().append_pair("name", name).append_pair("exact", "t");

        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let found: Vec<T> = response.json().await?;
        Ok(exact_match(found, name))
    }

    async fn create(&self, collection: &str, body: &Value) -> BackupResult<String> {
        let url = self.tenant_url(collection, None)?;
        let response = self
            .client
            .post(url)
            .header(TOKEN_HEADER, &self.token)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let created: ShieldTarget = response.json().await?;
        Ok(created.uuid)
    }

    /// Delete one resource; a 404 counts as already deleted
    async fn remove(&self, collection: &str, uuid: &str) -> BackupResult<()> {
        let url = self.tenant_url(collection, Some(uuid))?;
        let response = self
            .client
            .delete(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(collection = %collection, uuid = %uuid, "Already deleted");
                Ok(())
            }
            _ => Err(rejection(response).await),
        }
    }
}

/// SHIELD matches names by substring; only an exact match identifies our resource.
fn exact_match<T: Named>(found: Vec<T>, name: &str) -> Option<T> {
    found.into_iter().find(|item| item.name() == name)
}

async fn rejection(response: Response) -> BackupError {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status.is_server_error() {
        BackupError::unavailable(format!("HTTP {status}: {message}"))
    } else {
        BackupError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl BackupScheduler for ShieldScheduler {
    async fn create_schedule(&self, key: &ScheduleKey, target: &BackupTarget) -> BackupResult<()> {
        let job_name = key.job_name();
        if self.find::<ShieldJob>("jobs", &job_name).await?.is_some() {
            debug!(job = %job_name, "Backup job already exists");
            return Ok(());
        }

        let target_name = key.target_name();
        let (target_uuid, created) = match self.find::<ShieldTarget>("targets", &target_name).await? {
            Some(existing) => {
                debug!(target = %target_name, uuid = %existing.uuid, "Reusing backup target");
                (existing.uuid, false)
            }
            None => {
                let uuid = self.create("targets", &self.target_request(key, target)).await?;
                debug!(target = %target_name, uuid = %uuid, "Created backup target");
                (uuid, true)
            }
        };

        match self.create("jobs", &self.job_request(key, &target_uuid)).await {
            Ok(job_uuid) => {
                debug!(job = %job_name, uuid = %job_uuid, "Created backup job");
                Ok(())
            }
            Err(err) => {
                if created {
                    if let Err(e) = self.remove("targets", &target_uuid).await {
                        warn!(target = %target_name, uuid = %target_uuid, error = %e, "Failed to remove backup target after job creation failed");
                    }
                }
                Err(err)
            }
        }
    }

    async fn delete_schedule(&self, key: &ScheduleKey) -> BackupResult<()> {
        let job_name = key.job_name();
        let job = self
            .find::<ShieldJob>("jobs", &job_name)
            .await?
            .ok_or(BackupError::NotFound {
                name: job_name.clone(),
            })?;

        self.remove("jobs", &job.uuid).await?;

        match job.target {
            Some(target) => self.remove("targets", &target.uuid).await?,
            None => warn!(job = %job_name, "Backup job had no target attached"),
        }
        Ok(())
    }
}
