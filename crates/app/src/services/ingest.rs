use chrono::NaiveDate;
use tracing::info;
use warehouse_etl::{SqlPipeline, WarehouseInitializer};

use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use crate::util::time::resolve_dates;

#[derive(Clone)]
pub struct IngestService {
    config: SharedConfig,
}

impl IngestService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Moves shredded jobs through staging and the HPC database into the
    /// warehouse, then re-aggregates what changed. With dates, jobs ending in
    /// that range are re-promoted even when already in the warehouse.
    pub fn run(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
        let (start, end) = resolve_dates(start, end)?;
        let mut db = open_db(&self.config)?;
        let mut pipeline = SqlPipeline::standard(&self.config.units, &self.config.aggregate_schema);
        WarehouseInitializer::new(&mut db, &mut pipeline, self.config.initializer_config())
            .ingest_all(start, end)?;
        info!("Warehouse ingestion finished");
        Ok(())
    }
}
