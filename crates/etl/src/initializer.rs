use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warehouse_core::AggregationUnit;
use warehouse_db::Db;

use crate::aggregate::{Aggregator, JobsRealm};
use crate::error::Result;
use crate::filters::FilterListBuilder;
use crate::params::{END_DATE, LAST_MODIFIED_START_DATE, PipelineParams, START_DATE};
use crate::pipeline::PipelineRunner;
use crate::sections::{
    HPCDB_INGEST_COMMON, HPCDB_INGEST_JOBS, HPCDB_PREP_BY_DATE_RANGE, HPCDB_PREP_BY_NEW_JOBS,
    HPCDB_XDW_INGEST_COMMON, HPCDB_XDW_INGEST_JOBS, JOBS_XDW_AGGREGATE, STAGING_INGEST_COMMON,
    STAGING_INGEST_JOBS,
};

pub const JOBS_REALM: &str = "Jobs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializerConfig {
    pub units: Vec<AggregationUnit>,
    pub aggregate_schema: String,
    pub realms: Vec<String>,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        Self {
            units: AggregationUnit::ALL.to_vec(),
            aggregate_schema: "main".to_string(),
            realms: vec![JOBS_REALM.to_string()],
        }
    }
}

impl InitializerConfig {
    pub fn realm_enabled(&self, realm: &str) -> bool {
        self.realms
            .iter()
            .any(|enabled| enabled.eq_ignore_ascii_case(realm))
    }
}

/// Drives data from the shredded tables through staging and the HPC
/// database into the warehouse, then re-aggregates it.
///
/// Stages run strictly in order; the runner owns transactions.
pub struct WarehouseInitializer<'a, P: ?Sized> {
    db: &'a mut Db,
    runner: &'a mut P,
    config: InitializerConfig,
}

impl<'a, P: PipelineRunner + ?Sized> WarehouseInitializer<'a, P> {
    pub fn new(db: &'a mut Db, runner: &'a mut P, config: InitializerConfig) -> Self {
        Self { db, runner, config }
    }

    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    fn jobs_enabled(&self, stage: &str) -> bool {
        let enabled = self.config.realm_enabled(JOBS_REALM);
        if !enabled {
            debug!(stage, "Jobs realm disabled, skipping");
        }
        enabled
    }

    fn run(&mut self, sections: &[&str], params: &PipelineParams) -> Result<()> {
        self.runner.run(self.db, sections, params)
    }

    /// Runs every ingest stage, then aggregates what changed.
    pub fn ingest_all(&mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
        info!(?start, ?end, "Ingesting all data");
        self.ingest_all_shredded()?;
        self.ingest_all_staging()?;
        let watermark = self.ingest_all_hpcdb(start, end)?;
        self.aggregate_all_jobs(&watermark)?;
        info!("Ingestion complete");
        Ok(())
    }

    pub fn ingest_all_shredded(&mut self) -> Result<()> {
        if !self.jobs_enabled("shredded") {
            return Ok(());
        }
        info!("Ingesting shredded data to staging tables");
        self.run(
            &[STAGING_INGEST_COMMON, STAGING_INGEST_JOBS],
            &PipelineParams::new(),
        )
    }

    pub fn ingest_all_staging(&mut self) -> Result<()> {
        if !self.jobs_enabled("staging") {
            return Ok(());
        }
        info!("Ingesting staging data to HPCDB");
        self.run(&[HPCDB_INGEST_COMMON, HPCDB_INGEST_JOBS], &PipelineParams::new())
    }

    /// Promotes HPCDB jobs into the warehouse and returns the
    /// `last-modified-start-date` watermark, read from the database clock
    /// once the prep section has run.
    pub fn ingest_all_hpcdb(
        &mut self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<String> {
        if !self.jobs_enabled("hpcdb") {
            return Ok(self.db.now()?);
        }
        info!(?start, ?end, "Ingesting HPCDB data to the warehouse");

        if start.is_some() || end.is_some() {
            let mut params = PipelineParams::new();
            if let Some(start) = start {
                params.insert(START_DATE, format!("{start} 00:00:00"));
            }
            if let Some(end) = end {
                params.insert(END_DATE, format!("{end} 23:59:59"));
            }
            self.run(&[HPCDB_PREP_BY_DATE_RANGE], &params)?;
        } else {
            self.run(&[HPCDB_PREP_BY_NEW_JOBS], &PipelineParams::new())?;
        }

        let watermark = self.db.now()?;
        let params = PipelineParams::new().with(LAST_MODIFIED_START_DATE, watermark.as_str());
        self.run(&[HPCDB_XDW_INGEST_COMMON, HPCDB_XDW_INGEST_JOBS], &params)?;
        Ok(watermark)
    }

    /// Re-aggregates jobs modified at or after `last_modified_start_date` and
    /// rebuilds the filter lists.
    pub fn aggregate_all_jobs(&mut self, last_modified_start_date: &str) -> Result<()> {
        if !self.jobs_enabled("aggregate") {
            return Ok(());
        }
        info!(watermark = last_modified_start_date, "Aggregating jobs");
        let params =
            PipelineParams::new().with(LAST_MODIFIED_START_DATE, last_modified_start_date);
        self.run(&[JOBS_XDW_AGGREGATE], &params)?;
        FilterListBuilder::new(&self.config.aggregate_schema).build_realm_lists(self.db, &JobsRealm)
    }

    /// Direct aggregation: one aggregator per configured unit over
    /// `start..=end`, then a single filter-list rebuild.
    pub fn aggregate<A, F>(
        &mut self,
        mut factory: F,
        start: NaiveDate,
        end: NaiveDate,
        append: bool,
    ) -> Result<()>
    where
        A: Aggregator,
        F: FnMut(AggregationUnit) -> A,
    {
        let mut last = None;
        for unit in self.config.units.clone() {
            let aggregator = factory(unit);
            aggregator.execute(self.db, &self.config.aggregate_schema, start, end, append)?;
            last = Some(aggregator);
        }
        if let Some(aggregator) = last {
            aggregator.update_filters(self.db, &self.config.aggregate_schema)?;
        }
        Ok(())
    }
}
