use std::path::PathBuf;

use chrono::NaiveDate;
use ingest::{Format, Shredder, ShredderOptions};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, load_catalog, open_db};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShredInput {
    Directory(PathBuf),
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct ShredRequest {
    pub format: String,
    pub resource: String,
    pub input: ShredInput,
    /// Empty the format's staging table first.
    pub truncate: bool,
    /// Reload every staged row instead of only the newly shredded ones.
    pub ingest_all: bool,
    pub repair_node_cpu_counts: bool,
    pub error_report: Option<PathBuf>,
}

impl ShredRequest {
    pub fn new(format: impl Into<String>, resource: impl Into<String>, input: ShredInput) -> Self {
        Self {
            format: format.into(),
            resource: resource.into(),
            input,
            truncate: false,
            ingest_all: false,
            repair_node_cpu_counts: false,
            error_report: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ShredSummary {
    pub format: String,
    pub resource: String,
    pub files: usize,
    pub records: usize,
    pub duplicates: usize,
    pub records_examined: usize,
    pub records_loaded: usize,
    pub job_errors: usize,
    pub max_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct ShredService {
    config: SharedConfig,
}

impl ShredService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Shreds a log file or directory for one resource and loads the new rows
    /// into the generic job table.
    pub fn run(&self, request: &ShredRequest) -> Result<ShredSummary> {
        let catalog = load_catalog(&self.config)?;
        let format = Format::from_name(&request.format)?;
        let mut db = open_db(&self.config)?;
        let mut shredder = Shredder::new(&mut db, format)?.with_options(ShredderOptions {
            repair_node_cpu_counts: request.repair_node_cpu_counts,
        });
        shredder.set_resource(&request.resource, &catalog)?;
        if request.truncate {
            shredder.truncate()?;
        }

        match &request.input {
            ShredInput::Directory(dir) => {
                if shredder.shred_directory(dir)?.is_none() {
                    return Err(AppError::NotFound(format!(
                        "directory '{}' does not exist",
                        dir.display()
                    )));
                }
            }
            ShredInput::File(path) => {
                shredder.shred_file(path)?;
            }
        }

        let loaded = shredder.job_ingestor(request.ingest_all).run(shredder.db())?;

        if shredder.has_job_errors() {
            warn!(
                count = shredder.job_errors().len(),
                "Jobs with invalid data were found"
            );
            if let Some(path) = &request.error_report {
                shredder.write_job_errors(path)?;
                info!(path = %path.display(), "Wrote job error report");
            }
        }

        let stats = shredder.stats();
        let summary = ShredSummary {
            format: format.name().to_string(),
            resource: request.resource.clone(),
            files: stats.files,
            records: stats.records,
            duplicates: stats.duplicates,
            records_examined: loaded.records_examined,
            records_loaded: loaded.records_loaded,
            job_errors: shredder.job_errors().len(),
            max_date: shredder.job_max_date()?,
        };
        info!(
            format = %summary.format,
            resource = %summary.resource,
            records = summary.records,
            loaded = summary.records_loaded,
            "Shredding complete"
        );
        Ok(summary)
    }
}
