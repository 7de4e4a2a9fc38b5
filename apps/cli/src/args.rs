use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Loads HPC accounting logs into the warehouse and keeps its rollups
/// current.
#[derive(Debug, Parser)]
#[command(name = "hpc-warehouse", version, about)]
pub struct Cli {
    /// Warehouse config file (TOML). Defaults to ./warehouse.toml when present.
    #[arg(short, long, env = "WAREHOUSE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or upgrade the warehouse schema.
    Migrate,
    /// Shred accounting logs for one resource.
    Shred(ShredArgs),
    /// Promote shredded jobs into the warehouse and re-aggregate.
    Ingest(DateRange),
    /// Rebuild rollups over a date range.
    Aggregate(AggregateArgs),
}

#[derive(Debug, Args)]
pub struct ShredArgs {
    /// Log format: slurm, slurmjson, pbs (torque, pbspro), lsf or sge.
    #[arg(short, long)]
    pub format: String,

    /// Resource name from the resources file.
    #[arg(short, long)]
    pub resource: String,

    /// Directory of log files.
    #[arg(short, long, conflicts_with = "input", required_unless_present = "input")]
    pub dir: Option<PathBuf>,

    /// Single log file.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Empty the format's staging table first.
    #[arg(long)]
    pub truncate: bool,

    /// Reload every staged row rather than only new ones.
    #[arg(long)]
    pub ingest_all: bool,

    /// Raise zero node or cpu counts instead of only reporting them.
    #[arg(long)]
    pub repair: bool,

    /// Write jobs with invalid data to this file.
    #[arg(long)]
    pub error_report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DateRange {
    /// First day (YYYY-MM-DD).
    #[arg(short, long)]
    pub start: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD).
    #[arg(short, long)]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub range: DateRange,

    /// Add to existing rollup rows instead of replacing them.
    #[arg(long)]
    pub append: bool,
}
