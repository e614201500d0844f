//! Catalog Loader
//!
//! Reads one or more YAML catalog files, each holding a `services:` list with
//! nested plans, and folds them into a single [`PlanCatalog`].

use super::{PlanCatalog, Service};
use crate::config::{ConfigResult, ConfigurationError};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const MAX_CATALOG_FILE_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: Vec<Service>,
}

impl PlanCatalog {
    /// Load and merge the catalog files at `paths`.
    ///
    /// Fails if any file is unreadable, malformed, or if two files define the same
    /// service/plan pair.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Self> {
        let mut services = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let contents = read_catalog_file(path)?;
            let file: CatalogFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigurationError::invalid_yaml(path.display().to_string(), e))?;

            debug!(
                path = %path.display(),
                services = file.services.len(),
                "Parsed catalog file"
            );
            services.extend(file.services);
        }

        let catalog = Self::from_services(services)?;
        info!(
            services = catalog.services().len(),
            plans = catalog.len(),
            "Service catalog loaded"
        );
        Ok(catalog)
    }
}

fn read_catalog_file(path: &Path) -> ConfigResult<String> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

    if !metadata.is_file() {
        return Err(ConfigurationError::invalid_value(
            "catalog_path",
            path.display().to_string(),
            "catalog path must point to a regular file",
        ));
    }

    if metadata.len() > MAX_CATALOG_FILE_SIZE {
        return Err(ConfigurationError::invalid_value(
            "catalog_path",
            path.display().to_string(),
            format!(
                "catalog file too large ({} bytes > {} bytes limit)",
                metadata.len(),
                MAX_CATALOG_FILE_SIZE
            ),
        ));
    }

    std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
}
