//! # Structured Logging Module
//!
//! Console logging through the tracing ecosystem. Verbosity is driven by an
//! explicit [`LoggingConfig`] handed to [`init_structured_logging`] and to the
//! orchestrator, never by process-wide flags.

use crate::config::{ConfigResult, ConfigurationError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level for the broker's own targets
    pub level: String,
    /// Raise verbosity to debug and log rendered manifests
    pub debug: bool,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Force ANSI colours on or off; detected from the terminal when unset
    pub ansi: Option<bool>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
            json: false,
            ansi: None,
        }
    }
}

impl LoggingConfig {
    /// Config with debug output enabled, mostly useful in tests and local runs
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !VALID_LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                self.level.clone(),
                format!("expected one of {}", VALID_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }

    /// Filter directive honoring `RUST_LOG` first, then the configured level
    pub fn filter_directive(&self) -> String {
        if let Ok(directive) = std::env::var("RUST_LOG") {
            if !directive.is_empty() {
                return directive;
            }
        }
        let level = if self.debug { "debug" } else { self.level.as_str() };
        format!("{level},hyper=warn,reqwest=warn")
    }
}

/// Initialize console logging once per process.
///
/// Safe to call repeatedly; a subscriber installed by someone else is left alone.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let directive = config.filter_directive();
        let use_ansi = config
            .ansi
            .unwrap_or_else(|| std::io::stderr().is_terminal());

        let layer = if config.json {
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&directive))
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&directive))
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            filter = %directive,
            json = config.json,
            debug = config.debug,
            "Structured logging initialized"
        );
    });
}

/// Log structured data for a lifecycle operation on one instance
pub fn log_lifecycle_operation(
    operation: &str,
    instance_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        instance_id = %instance_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "LIFECYCLE_OPERATION"
    );
}

/// Log a lifecycle failure with its error kind
pub fn log_lifecycle_error(operation: &str, instance_id: &str, kind: &str, error: &str) {
    tracing::error!(
        operation = %operation,
        instance_id = %instance_id,
        error_kind = %kind,
        error = %error,
        timestamp = %Utc::now().to_rfc3339(),
        "LIFECYCLE_ERROR"
    );
}
