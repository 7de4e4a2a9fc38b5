mod aggregate;
mod ingest;
mod shred;

use std::sync::Arc;

use tracing::debug;
use warehouse_core::ResourceCatalog;
use warehouse_db::Db;

use crate::config::WarehouseConfig;
use crate::error::Result;
use crate::resources::load_resources;

pub use aggregate::AggregateService;
pub use ingest::IngestService;
pub use shred::{ShredInput, ShredRequest, ShredService, ShredSummary};

type SharedConfig = Arc<WarehouseConfig>;

/// Service registry for warehouse operations.
#[derive(Clone)]
pub struct AppServices {
    pub shred: ShredService,
    pub ingest: IngestService,
    pub aggregate: AggregateService,
}

impl AppServices {
    pub fn new(config: &WarehouseConfig) -> Self {
        let shared = Arc::new(config.clone());
        Self {
            shred: ShredService::new(shared.clone()),
            ingest: IngestService::new(shared.clone()),
            aggregate: AggregateService::new(shared),
        }
    }
}

/// Opens the warehouse database with the aggregate database attached when
/// one is configured.
pub(crate) fn open_db(config: &WarehouseConfig) -> Result<Db> {
    let db = Db::open(&config.db_path)?;
    if let Some(path) = &config.aggregate_db_path {
        debug!(schema = %config.aggregate_schema, "Attaching aggregate database");
        db.attach(path, &config.aggregate_schema)?;
    }
    Ok(db)
}

fn load_catalog(config: &WarehouseConfig) -> Result<ResourceCatalog> {
    load_resources(&config.resources_path)
}
