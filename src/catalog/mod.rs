//! # Plan Catalog
//!
//! Static mapping from `(service_id, plan_id)` to a [`Plan`], loaded once at startup
//! and read-only afterwards. Lookups go through the composite [`PlanKey`] so that no
//! separator character inside an id can make two distinct pairs collide.

pub mod loader;

use crate::backup::BackupTarget;
use crate::config::ConfigurationError;
use crate::error::{BrokerError, BrokerResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Composite catalog key. Field order is always service first, then plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanKey {
    pub service_id: String,
    pub plan_id: String,
}

impl PlanKey {
    pub fn new(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
        }
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service '{}' plan '{}'", self.service_id, self.plan_id)
    }
}

/// One deployable variant of a managed service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Deployment manifest template; `(( key ))` placeholders are filled at provision time
    pub manifest: Value,
    /// Credentials template rendered alongside the manifest and handed out on bind
    #[serde(default)]
    pub credentials: Value,
    /// Default parameters, overridden by caller parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub backup: Option<BackupTarget>,
}

/// A catalog entry as advertised to the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_bindable")]
    pub bindable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub plans: Vec<Plan>,
}

fn default_bindable() -> bool {
    true
}

/// Plan summary for catalog responses; templates stay private to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogService {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub tags: Vec<String>,
    pub plans: Vec<ServicePlan>,
}

impl From<&Service> for CatalogService {
    fn from(service: &Service) -> Self {
        Self {
            id: service.id.clone(),
            name: service.name.clone(),
            description: service.description.clone(),
            bindable: service.bindable,
            tags: service.tags.clone(),
            plans: service
                .plans
                .iter()
                .map(|p| ServicePlan {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    description: p.description.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    services: Vec<CatalogService>,
    plans: HashMap<PlanKey, Arc<Plan>>,
}

impl PlanCatalog {
    /// Build a catalog from parsed services, rejecting empty ids and duplicate plans
    pub fn from_services(services: Vec<Service>) -> Result<Self, ConfigurationError> {
        let mut plans = HashMap::new();
        let mut listing = Vec::with_capacity(services.len());

        for service in &services {
            if service.id.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "id",
                    format!("service '{}'", service.name),
                ));
            }
            for plan in &service.plans {
                if plan.id.trim().is_empty() {
                    return Err(ConfigurationError::missing_required_field(
                        "id",
                        format!("plan '{}' of service '{}'", plan.name, service.id),
                    ));
                }
                let key = PlanKey::new(&service.id, &plan.id);
                tracing::debug!(service_id = %service.id, plan_id = %plan.id, "tracking service plan");
                if plans.insert(key.clone(), Arc::new(plan.clone())).is_some() {
                    return Err(ConfigurationError::validation_error(format!(
                        "duplicate catalog entry for {key}"
                    )));
                }
            }
            listing.push(CatalogService::from(service));
        }

        Ok(Self {
            services: listing,
            plans,
        })
    }

    pub fn lookup(&self, service_id: &str, plan_id: &str) -> BrokerResult<Arc<Plan>> {
        let key = PlanKey::new(service_id, plan_id);
        match self.plans.get(&key) {
            Some(plan) => Ok(Arc::clone(plan)),
            None => Err(BrokerError::PlanNotFound { key }),
        }
    }

    pub fn services(&self) -> &[CatalogService] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
