#![allow(clippy::doc_markdown)] // Allow technical terms like BOSH, SHIELD in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Blacksmith Core
//!
//! Lifecycle core of an on-demand service broker. Service instances are BOSH
//! deployments; the state of the last operation on each instance lives in Vault; each
//! instance can get a periodic SHIELD backup schedule.
//!
//! ## Overview
//!
//! A platform asks the broker to provision, deprovision, bind, unbind, update and poll
//! service instances. Provision and deprovision are asynchronous: the broker submits
//! a deployment (or teardown) to the director, records the returned task id in the
//! operation ledger, and answers immediately. Later polls read the record back, ask
//! the director about the task, and translate its status into the platform's
//! `in progress` / `succeeded` / `failed` vocabulary.
//!
//! ## Module Organization
//!
//! - [`catalog`] - Services and plans, keyed by `(service_id, plan_id)`
//! - [`manifest`] - Rendering of plan templates into manifests and credentials
//! - [`gateway`] - Deployment gateway contract and the BOSH director client
//! - [`ledger`] - Operation records and their Vault-backed store
//! - [`state_machine`] - Task status reconciliation
//! - [`backup`] - Backup schedules and the SHIELD client
//! - [`orchestrator`] - The lifecycle operations themselves
//! - [`broker`] - Catalog, orchestrator and backup scheduling composed for the platform
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Error kinds surfaced to callers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blacksmith_core::backup::NoopScheduler;
//! use blacksmith_core::catalog::PlanCatalog;
//! use blacksmith_core::config::ConfigLoader;
//! use blacksmith_core::gateway::BoshGateway;
//! use blacksmith_core::ledger::VaultLedger;
//! use blacksmith_core::orchestrator::ProvisionDetails;
//! use blacksmith_core::ServiceBroker;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! let catalog = PlanCatalog::load(&config.broker.catalog_paths)?;
//! let broker = ServiceBroker::from_config(
//!     &config,
//!     catalog,
//!     Arc::new(BoshGateway::new(&config.bosh)?),
//!     Arc::new(VaultLedger::new(&config.vault)?),
//!     Arc::new(NoopScheduler),
//! );
//!
//! let details = ProvisionDetails {
//!     service_id: "redis".to_string(),
//!     plan_id: "small".to_string(),
//!     parameters: Default::default(),
//! };
//! broker.provision("instance-1", &details).await?;
//! let state = broker.last_operation("instance-1").await?.state;
//! println!("instance-1 is {state}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! [`test_helpers`] provides in-process fakes for the director and the backup
//! service; pair them with [`ledger::InMemoryLedger`] to exercise full lifecycles
//! without any network.

pub mod backup;
pub mod broker;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod state_machine;
pub mod test_helpers;

pub use broker::ServiceBroker;
pub use catalog::{Plan, PlanCatalog, PlanKey};
pub use config::{BrokerConfig, ConfigLoader, ConfigurationError};
pub use error::{BrokerError, BrokerResult};
pub use logging::{init_structured_logging, LoggingConfig};
pub use orchestrator::LifecycleOrchestrator;
pub use state_machine::LastOperationState;
