use std::path::Path;

use anyhow::{Context, Result};
use warehouse_app::WarehouseConfig;

const DEFAULT_CONFIG_FILE: &str = "warehouse.toml";

/// Reads the given config file, or `./warehouse.toml` when it exists, or
/// falls back to defaults rooted in the working directory.
pub fn load(explicit: Option<&Path>) -> Result<WarehouseConfig> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Some(cwd.join(DEFAULT_CONFIG_FILE)).filter(|path| path.exists()),
    };
    match path {
        Some(path) => load_file(&path),
        None => {
            tracing::debug!(dir = %cwd.display(), "No config file, using defaults");
            Ok(WarehouseConfig::in_dir(&cwd))
        }
    }
}

fn load_file(path: &Path) -> Result<WarehouseConfig> {
    WarehouseConfig::load(path).with_context(|| format!("loading config from {}", path.display()))
}
