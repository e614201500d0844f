//! # Vault-backed Ledger
//!
//! Stores one record per instance at `<mount>/<instance id>` in a KV (v1) secrets
//! engine, so operation state and generated credentials survive broker restarts.

use super::{LedgerError, LedgerResult, OperationLedger, OperationRecord};
use crate::config::{ConfigResult, ConfigurationError, VaultConfig};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct SecretResponse {
    data: serde_json::Value,
}

#[derive(Clone)]
pub struct VaultLedger {
    client: Client,
    base_url: Url,
    mount: String,
    token: String,
}

impl std::fmt::Debug for VaultLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultLedger")
            .field("base_url", &self.base_url.as_str())
            .field("mount", &self.mount)
            .finish()
    }
}

impl VaultLedger {
    pub fn new(config: &VaultConfig) -> ConfigResult<Self> {
        let base_url = Url::parse(&config.address).map_err(|e| {
            ConfigurationError::invalid_value("vault.address", config.address.clone(), e.to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.skip_ssl_validation)
            .user_agent(format!("blacksmith/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfigurationError::validation_error(format!("Failed to create Vault client: {e}"))
            })?;

        info!(base_url = %base_url, mount = %config.mount, "Created Vault ledger client");

        Ok(Self {
            client,
            base_url,
            mount: config.mount.trim_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// `/v1/<mount segments>/<instance id>`, with the instance id as one encoded segment
    pub(crate) fn secret_url(&self, instance_id: &str) -> LedgerResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| LedgerError::unavailable("Vault URL cannot be a base"))?;
            segments.clear().push("v1");
            segments.extend(self.mount.split('/').filter(|s| !s.is_empty()));
            segments.push(instance_id);
        }
        Ok(url)
    }
}

async fn rejection(response: Response) -> LedgerError {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status.is_server_error() {
        // Sealed or standby vaults answer 503.
        LedgerError::unavailable(format!("HTTP {status}: {message}"))
    } else {
        LedgerError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl OperationLedger for VaultLedger {
    async fn put(&self, instance_id: &str, record: &OperationRecord) -> LedgerResult<()> {
        let url = self.secret_url(instance_id)?;
        debug!(instance_id = %instance_id, kind = %record.kind, task_id = %record.task_id, "Writing operation record");
        let response = self
            .client
            .put(url)
            .header(TOKEN_HEADER, &self.token)
            .json(record)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn get(&self, instance_id: &str) -> LedgerResult<Option<OperationRecord>> {
        let url = self.secret_url(instance_id)?;
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let secret: SecretResponse = response.json().await.map_err(|e| LedgerError::Corrupt {
            instance_id: instance_id.to_string(),
            reason: e.to_string(),
        })?;
        let record = serde_json::from_value(secret.data).map_err(|e| LedgerError::Corrupt {
            instance_id: instance_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    async fn delete(&self, instance_id: &str) -> LedgerResult<()> {
        let url = self.secret_url(instance_id)?;
        debug!(instance_id = %instance_id, "Clearing operation record");
        let response = self
            .client
            .delete(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }
}
