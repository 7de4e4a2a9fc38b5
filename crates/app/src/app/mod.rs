use std::path::Path;

use tracing::info;
use warehouse_db::Db;

use crate::config::WarehouseConfig;
use crate::error::Result;
use crate::services::{self, AppServices};

/// Application state shared by frontends.
#[derive(Clone)]
pub struct AppState {
    pub config: WarehouseConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: WarehouseConfig) -> Self {
        let services = AppServices::new(&config);
        Self { config, services }
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        Ok(Self::new(WarehouseConfig::load(config_path)?))
    }

    pub fn is_fresh_db(&self) -> bool {
        !self.config.db_path.exists()
    }

    pub fn setup_db(&self) -> Result<()> {
        let fresh = self.is_fresh_db();
        setup_db(&self.config.db_path)?;
        if fresh {
            info!(path = %self.config.db_path.display(), "Created warehouse database");
        }
        Ok(())
    }

    pub fn open_db(&self) -> Result<Db> {
        services::open_db(&self.config)
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
