use thiserror::Error;
use warehouse_db::DbError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("db error: {0}")]
    Db(#[from] DbError),
    #[error("section '{section}' failed in action '{action}': {source}")]
    Stage {
        section: String,
        action: String,
        #[source]
        source: Box<PipelineError>,
    },
    #[error("action '{action}' requires parameter '{name}'")]
    MissingParameter { action: String, name: String },
    #[error("unknown pipeline section '{0}'")]
    UnknownSection(String),
    #[error("invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
