//! Promotion of shredded accounting data into the warehouse and its
//! time-series rollups.

pub mod aggregate;
pub mod error;
pub mod filters;
pub mod initializer;
pub mod params;
pub mod pipeline;
pub mod sections;

pub use aggregate::{AggregateStats, Aggregator, Dimension, JobsRealm, Realm, TimeseriesAggregator};
pub use error::{PipelineError, Result};
pub use filters::FilterListBuilder;
pub use initializer::{InitializerConfig, JOBS_REALM, WarehouseInitializer};
pub use params::{END_DATE, LAST_MODIFIED_START_DATE, PipelineParams, START_DATE};
pub use pipeline::{EtlAction, PipelineRunner, Section, SqlAction, SqlPipeline};
pub use sections::JobsAggregateAction;
