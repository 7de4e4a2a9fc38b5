mod format;
mod ingestor;
mod lsf;
mod parsed;
mod pbs;
mod report;
mod sge;
mod shredder;
mod slurm;
mod slurm_json;
mod types;
mod validate;
mod walker;

pub use format::{ColumnMap, Format};
pub use ingestor::{DeleteDirective, IncrementalIngestor};
pub use shredder::{GENERIC_TABLE, Shredder, ShredderOptions};
pub use types::{IngestorStats, Result, ShredError, ShredStats};
pub use validate::{
    JobTimes, check_job_times, check_nodes_and_cpus, fix_job_times, fix_nodes_and_cpus,
};
