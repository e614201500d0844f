//! Configuration Loader
//!
//! Environment-aware layering of the broker configuration on top of the `config`
//! crate: serde defaults, then an optional YAML file, then environment overrides.

use super::error::ConfigResult;
use super::BrokerConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::Path;
use tracing::debug;

const ENV_PREFIX: &str = "BLACKSMITH";
const ENV_SEPARATOR: &str = "__";

/// Zero-state loader; all methods are associated functions.
#[derive(Debug)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load using `BLACKSMITH_CONFIG_PATH` if set, plus environment overrides
    pub fn load() -> ConfigResult<BrokerConfig> {
        let path = env::var("BLACKSMITH_CONFIG_PATH").ok();
        Self::load_from_path(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or none), plus environment overrides
    pub fn load_from_path(path: Option<&Path>) -> ConfigResult<BrokerConfig> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading broker configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        let config = builder.add_source(Self::environment_source()).build()?;
        Self::finish(config.try_deserialize()?)
    }

    /// Load from YAML text without consulting the process environment
    pub fn load_from_str(yaml: &str) -> ConfigResult<BrokerConfig> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        let broker_config: BrokerConfig = config.try_deserialize()?;
        broker_config.validate()?;
        Ok(broker_config)
    }

    /// Detect the deployment environment name
    pub fn detect_environment() -> String {
        env::var("BLACKSMITH_ENV").unwrap_or_else(|_| "development".to_string())
    }

    fn environment_source() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("broker.catalog_paths")
            .with_list_parse_key("shield.enabled_on_targets")
    }

    fn finish(mut config: BrokerConfig) -> ConfigResult<BrokerConfig> {
        // Legacy toggle: any non-empty value turns on debug logging.
        if env::var("BLACKSMITH_DEBUG").is_ok_and(|v| !v.is_empty()) {
            config.logging.debug = true;
        }

        config.validate()?;

        debug!(
            environment = %Self::detect_environment(),
            config = %config.sanitized(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}
