//! # Blacksmith CLI
//!
//! Operator command-line interface for driving the broker's lifecycle operations
//! directly against the configured BOSH director, Vault and SHIELD.

use anyhow::{bail, Context};
use blacksmith_core::backup::{BackupScheduler, NoopScheduler, ShieldScheduler};
use blacksmith_core::gateway::BoshGateway;
use blacksmith_core::ledger::VaultLedger;
use blacksmith_core::orchestrator::{BindDetails, DeprovisionDetails, ProvisionDetails};
use blacksmith_core::{
    init_structured_logging, BrokerConfig, ConfigLoader, PlanCatalog, ServiceBroker,
};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "blacksmith")]
#[command(about = "Command-line interface for the Blacksmith service broker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BLACKSMITH_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging, including rendered manifests
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the service catalog
    Catalog,
    /// Provision a new service instance
    Provision {
        #[arg(value_name = "INSTANCE_ID")]
        instance_id: String,
        /// Service id from the catalog
        #[arg(short, long)]
        service: String,
        /// Plan id from the catalog
        #[arg(short, long)]
        plan: String,
        /// Provisioning parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
    },
    /// Tear down a service instance
    Deprovision {
        #[arg(value_name = "INSTANCE_ID")]
        instance_id: String,
        #[arg(short, long)]
        service: String,
        #[arg(short, long)]
        plan: String,
    },
    /// Print the credentials of a service instance
    Bind {
        #[arg(value_name = "INSTANCE_ID")]
        instance_id: String,
        /// Binding id used for request correlation
        #[arg(short, long, default_value = "cli-binding")]
        binding: String,
    },
    /// Report the state of the last operation on an instance
    LastOperation {
        #[arg(value_name = "INSTANCE_ID")]
        instance_id: String,
    },
    /// Print the loaded configuration with secrets masked
    Config,
}

fn parse_params(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("--params is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--params must be a JSON object"),
    }
}

fn build_broker(config: &BrokerConfig) -> anyhow::Result<ServiceBroker> {
    let catalog = PlanCatalog::load(&config.broker.catalog_paths)
        .context("failed to load service catalog")?;
    let scheduler: Arc<dyn BackupScheduler> = if config.shield.enabled {
        Arc::new(ShieldScheduler::new(&config.shield)?)
    } else {
        Arc::new(NoopScheduler)
    };
    let broker = ServiceBroker::from_config(
        config,
        catalog,
        Arc::new(BoshGateway::new(&config.bosh)?),
        Arc::new(VaultLedger::new(&config.vault)?),
        scheduler,
    );

    info!(
        environment = %ConfigLoader::detect_environment(),
        broker = %broker.name(),
        "Blacksmith CLI starting"
    );
    Ok(broker)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load_from_path(cli.config.as_deref())
        .context("failed to load broker configuration")?;
    if cli.debug {
        config.logging.debug = true;
    }
    init_structured_logging(&config.logging);

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.sanitized())?);
        }
        Commands::Catalog => {
            let broker = build_broker(&config)?;
            println!("{}", serde_json::to_string_pretty(broker.services())?);
        }
        Commands::Provision {
            instance_id,
            service,
            plan,
            params,
        } => {
            let details = ProvisionDetails {
                service_id: service,
                plan_id: plan,
                parameters: parse_params(params.as_deref())?,
            };
            let broker = build_broker(&config)?;
            let spec = broker.provision(&instance_id, &details).await?;
            println!("{}", serde_json::to_string_pretty(&spec)?);
        }
        Commands::Deprovision {
            instance_id,
            service,
            plan,
        } => {
            let details = DeprovisionDetails {
                service_id: service,
                plan_id: plan,
            };
            let broker = build_broker(&config)?;
            let accepted = broker.deprovision(&instance_id, &details).await?;
            println!("{}", serde_json::to_string_pretty(&accepted)?);
        }
        Commands::Bind {
            instance_id,
            binding,
        } => {
            let broker = build_broker(&config)?;
            let bound = broker
                .bind(&instance_id, &binding, &BindDetails::default())
                .await?;
            println!("{}", serde_json::to_string_pretty(&bound)?);
        }
        Commands::LastOperation { instance_id } => {
            let broker = build_broker(&config)?;
            let op = broker.last_operation(&instance_id).await?;
            println!("{}", serde_json::to_string_pretty(&op)?);
        }
    }

    Ok(())
}
