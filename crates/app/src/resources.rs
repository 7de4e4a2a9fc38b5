use std::collections::HashSet;
use std::path::Path;

use tracing::debug;
use warehouse_core::{ConfigError, ResourceCatalog, ResourceConfig};

use crate::error::Result;

/// Reads the resource list, a JSON array of resource entries.
pub fn load_resources(path: &Path) -> Result<ResourceCatalog> {
    let contents = std::fs::read_to_string(path)?;
    let catalog = parse_resources(&contents)?;
    debug!(
        path = %path.display(),
        resources = catalog.resources().len(),
        "Loaded resources"
    );
    Ok(catalog)
}

pub fn parse_resources(contents: &str) -> Result<ResourceCatalog> {
    let resources: Vec<ResourceConfig> = serde_json::from_str(contents)?;
    let mut seen = HashSet::new();
    for resource in &resources {
        if resource.resource.trim().is_empty() {
            return Err(ConfigError::Invalid("resource name must not be empty".to_string()).into());
        }
        if !seen.insert(resource.resource.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "resource '{}' is listed more than once",
                resource.resource
            ))
            .into());
        }
    }
    Ok(ResourceCatalog::new(resources))
}
