//! # Broker Configuration
//!
//! Typed configuration for the broker and the three backends it talks to.
//! Values are layered by [`ConfigLoader`]: struct defaults, then an optional YAML
//! file, then `BLACKSMITH__SECTION__FIELD` environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blacksmith_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! println!("BOSH director at {}", config.bosh.address);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

const MASKED: &str = "********";

/// Root configuration structure mirroring blacksmith.yml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub broker: BrokerSettings,

    /// BOSH director (deployment gateway)
    pub bosh: BoshConfig,

    /// Vault (operation ledger and generated credentials)
    pub vault: VaultConfig,

    /// SHIELD (backup scheduling)
    #[serde(default)]
    pub shield: ShieldConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub name: String,
    /// Serialize lifecycle calls per instance id inside this process
    pub serialize_instances: bool,
    /// Catalog YAML files, merged in order
    pub catalog_paths: Vec<PathBuf>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            name: "blacksmith".to_string(),
            serialize_instances: true,
            catalog_paths: Vec::new(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct BoshConfig {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub skip_ssl_validation: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl fmt::Debug for BoshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoshConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &MASKED)
            .field("skip_ssl_validation", &self.skip_ssl_validation)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    pub address: String,
    #[serde(default)]
    pub token: String,
    /// KV mount under which one record per instance is stored
    #[serde(default = "default_vault_mount")]
    pub mount: String,
    #[serde(default)]
    pub skip_ssl_validation: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &MASKED)
            .field("mount", &self.mount)
            .field("skip_ssl_validation", &self.skip_ssl_validation)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShieldConfig {
    pub enabled: bool,
    pub address: String,
    pub token: String,
    pub insecure: bool,
    pub tenant_uuid: String,
    pub store_uuid: String,
    /// Timespec understood by SHIELD, e.g. "daily 3am"
    pub schedule: String,
    /// Retention expression, e.g. "7d"
    pub retain: String,
    pub retries: u32,
    /// Service ids whose instances get backup schedules; empty means all
    pub enabled_on_targets: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            token: String::new(),
            insecure: false,
            tenant_uuid: String::new(),
            store_uuid: String::new(),
            schedule: "daily 3am".to_string(),
            retain: "7d".to_string(),
            retries: 3,
            enabled_on_targets: Vec::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl fmt::Debug for ShieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldConfig")
            .field("enabled", &self.enabled)
            .field("address", &self.address)
            .field("token", &MASKED)
            .field("insecure", &self.insecure)
            .field("tenant_uuid", &self.tenant_uuid)
            .field("store_uuid", &self.store_uuid)
            .field("schedule", &self.schedule)
            .field("retain", &self.retain)
            .field("retries", &self.retries)
            .field("enabled_on_targets", &self.enabled_on_targets)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ShieldConfig {
    /// Whether instances of `service_id` should get a backup schedule
    pub fn covers_service(&self, service_id: &str) -> bool {
        self.enabled
            && (self.enabled_on_targets.is_empty()
                || self.enabled_on_targets.iter().any(|s| s == service_id))
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_vault_mount() -> String {
    "secret".to_string()
}

fn require(value: &str, field: &str, context: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::missing_required_field(field, context));
    }
    Ok(())
}

fn require_http_url(value: &str, field: &str) -> ConfigResult<()> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigurationError::invalid_value(
            field,
            value,
            "address must be an http:// or https:// URL",
        ));
    }
    Ok(())
}

impl BrokerConfig {
    /// Validate cross-field requirements that serde defaults cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        require(&self.bosh.address, "address", "bosh")?;
        require_http_url(&self.bosh.address, "bosh.address")?;
        require(&self.vault.address, "address", "vault")?;
        require_http_url(&self.vault.address, "vault.address")?;
        require(&self.vault.mount, "mount", "vault")?;

        if self.bosh.timeout_ms == 0 || self.vault.timeout_ms == 0 {
            return Err(ConfigurationError::validation_error(
                "backend timeouts must be greater than zero",
            ));
        }

        if self.shield.enabled {
            require(&self.shield.address, "address", "shield")?;
            require_http_url(&self.shield.address, "shield.address")?;
            require(&self.shield.tenant_uuid, "tenant_uuid", "shield")?;
            require(&self.shield.store_uuid, "store_uuid", "shield")?;
            require(&self.shield.schedule, "schedule", "shield")?;
            require(&self.shield.retain, "retain", "shield")?;
            if self.shield.timeout_ms == 0 {
                return Err(ConfigurationError::validation_error(
                    "shield.timeout_ms must be greater than zero",
                ));
            }
        }

        self.logging.validate()?;
        Ok(())
    }

    /// JSON view of the configuration with credentials masked, safe to log
    pub fn sanitized(&self) -> serde_json::Value {
        let mask = |s: &str| if s.is_empty() { "" } else { MASKED };
        json!({
            "logging": self.logging,
            "broker": self.broker,
            "bosh": {
                "address": self.bosh.address,
                "username": self.bosh.username,
                "password": mask(&self.bosh.password),
                "skip_ssl_validation": self.bosh.skip_ssl_validation,
                "timeout_ms": self.bosh.timeout_ms,
            },
            "vault": {
                "address": self.vault.address,
                "token": mask(&self.vault.token),
                "mount": self.vault.mount,
                "skip_ssl_validation": self.vault.skip_ssl_validation,
                "timeout_ms": self.vault.timeout_ms,
            },
            "shield": {
                "enabled": self.shield.enabled,
                "address": self.shield.address,
                "token": mask(&self.shield.token),
                "insecure": self.shield.insecure,
                "tenant_uuid": self.shield.tenant_uuid,
                "store_uuid": self.shield.store_uuid,
                "schedule": self.shield.schedule,
                "retain": self.shield.retain,
                "retries": self.shield.retries,
                "enabled_on_targets": self.shield.enabled_on_targets,
                "timeout_ms": self.shield.timeout_ms,
            },
        })
    }
}
