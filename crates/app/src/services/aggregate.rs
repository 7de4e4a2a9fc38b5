use chrono::NaiveDate;
use tracing::info;
use warehouse_etl::{JobsRealm, SqlPipeline, TimeseriesAggregator, WarehouseInitializer};

use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use crate::util::time::resolve_window;

#[derive(Clone)]
pub struct AggregateService {
    config: SharedConfig,
}

impl AggregateService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Rebuilds job rollups for every configured unit over `start..=end`.
    pub fn run(&self, start: Option<NaiveDate>, end: Option<NaiveDate>, append: bool) -> Result<()> {
        let (start, end) = resolve_window(start, end)?;
        let mut db = open_db(&self.config)?;
        let mut pipeline = SqlPipeline::new();
        WarehouseInitializer::new(&mut db, &mut pipeline, self.config.initializer_config())
            .aggregate(
                |unit| TimeseriesAggregator::new(JobsRealm, unit),
                start,
                end,
                append,
            )?;
        info!(%start, %end, append, "Aggregation finished");
        Ok(())
    }
}
