use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warehouse_core::AggregationUnit;
use warehouse_etl::InitializerConfig;

use crate::error::{AppError, Result};

const DEFAULT_DB_FILE: &str = "warehouse.sqlite";
const DEFAULT_RESOURCES_FILE: &str = "resources.json";
const DEFAULT_AGGREGATE_SCHEMA: &str = "main";

/// Warehouse settings read from a TOML file.
///
/// ```toml
/// db_path = "warehouse.sqlite"
/// aggregate_db_path = "aggregates.sqlite"
/// aggregate_schema = "modw_aggregates"
/// resources_path = "resources.json"
/// units = ["day", "month"]
/// realms = ["Jobs"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
    /// Separate database for rollups, attached as `aggregate_schema`.
    pub aggregate_db_path: Option<PathBuf>,
    pub aggregate_schema: String,
    pub resources_path: PathBuf,
    pub units: Vec<AggregationUnit>,
    pub realms: Vec<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let initializer = InitializerConfig::default();
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            aggregate_db_path: None,
            aggregate_schema: DEFAULT_AGGREGATE_SCHEMA.to_string(),
            resources_path: PathBuf::from(DEFAULT_RESOURCES_FILE),
            units: initializer.units,
            realms: initializer.realms,
        }
    }
}

impl WarehouseConfig {
    /// Loads a config file; relative paths inside it are taken relative to
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolved_against(base))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Config rooted in `dir` with default file names.
    pub fn in_dir(dir: &Path) -> Self {
        Self::default().resolved_against(dir)
    }

    pub fn resolved_against(mut self, base: &Path) -> Self {
        self.db_path = resolve(base, &self.db_path);
        self.resources_path = resolve(base, &self.resources_path);
        self.aggregate_db_path = self.aggregate_db_path.map(|path| resolve(base, &path));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.units.is_empty() {
            return Err(AppError::InvalidInput(
                "at least one aggregation unit is required".to_string(),
            ));
        }
        if self.aggregate_schema.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "aggregate_schema must not be empty".to_string(),
            ));
        }
        if self.aggregate_db_path.is_some() && self.aggregate_schema == DEFAULT_AGGREGATE_SCHEMA {
            return Err(AppError::InvalidInput(
                "aggregate_db_path needs an aggregate_schema other than 'main'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn initializer_config(&self) -> InitializerConfig {
        InitializerConfig {
            units: self.units.clone(),
            aggregate_schema: self.aggregate_schema.clone(),
            realms: self.realms.clone(),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
