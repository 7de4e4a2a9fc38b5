use std::io;
use std::path::PathBuf;

use serde::Serialize;
use warehouse_core::ConfigError;
use warehouse_db::DbError;

/// Counters accumulated by a shredder across files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShredStats {
    pub files: usize,
    pub records: usize,
    pub duplicates: usize,
}

/// Summary of one incremental ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestorStats {
    pub records_examined: usize,
    pub records_loaded: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ShredError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown shredder format '{0}'")]
    UnknownFormat(String),
    #[error("{0}")]
    Parse(String),
    #[error("db error: {0}")]
    Db(#[from] DbError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("'{0}' is not a file")]
    NotAFile(PathBuf),
    #[error("Failed to shred line {line_number} of file {file} \"{line}\": {source}")]
    Line {
        file: String,
        line_number: usize,
        line: String,
        #[source]
        source: Box<ShredError>,
    },
}

impl ShredError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ShredError>;
