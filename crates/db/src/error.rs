use rusqlite::ErrorCode;
use rusqlite::ffi;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A unique or primary-key constraint rejected the row.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("time parse error: {0}")]
    TimeParse(#[from] chrono::ParseError),
    #[error("transaction error: {0}")]
    Transaction(&'static str),
}

impl DbError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &err
            && failure.code == ErrorCode::ConstraintViolation
            && matches!(
                failure.extended_code,
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            )
        {
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            return Self::Duplicate(message);
        }
        Self::Sqlite(err)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
