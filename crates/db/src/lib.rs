mod error;
mod helpers;
mod migrations;
mod recorder;
mod shredded;
mod statements;
mod transaction;
mod types;

use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

pub use error::{DbError, Result};
pub use helpers::quote_identifier;
pub use recorder::QueryRecorder;
pub use types::{RecordedQuery, Row, Value};

/// SQLite connection shared by the shredders, ingestors and aggregators.
///
/// A `Db` is single-writer: shredding and ingestion for one format must run
/// serially, because high-water marks are snapshotted without locking.
pub struct Db {
    conn: Connection,
    recorder: Option<QueryRecorder>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(Self {
            conn,
            recorder: None,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn,
            recorder: None,
        })
    }

    pub fn with_recorder(mut self, recorder: QueryRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn recorder(&self) -> Option<&QueryRecorder> {
        self.recorder.as_ref()
    }

    /// Attaches another database file under `schema`.
    pub fn attach(&self, path: impl AsRef<Path>, schema: &str) -> Result<()> {
        let path = path.as_ref().to_string_lossy().to_string();
        debug!(schema, path = %path, "attaching database");
        self.conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", quote_identifier(schema)),
            [path],
        )?;
        Ok(())
    }
}
