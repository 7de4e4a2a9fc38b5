use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("db error: {0}")]
    Db(#[from] warehouse_db::DbError),
    #[error(transparent)]
    Shred(#[from] ingest::ShredError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] warehouse_etl::PipelineError),
    #[error("config error: {0}")]
    Config(#[from] warehouse_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
