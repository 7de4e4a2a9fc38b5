use tracing::warn;

use crate::Db;
use crate::error::{DbError, Result};

impl Db {
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Err(DbError::Transaction("a transaction is already active"));
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction() {
            return Err(DbError::Transaction("commit without an active transaction"));
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn roll_back(&mut self) -> Result<()> {
        if !self.in_transaction() {
            return Err(DbError::Transaction("rollback without an active transaction"));
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Runs `f` inside a transaction, committing on success and rolling back
    /// on any error.
    pub fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Db) -> std::result::Result<T, E>,
        E: From<DbError>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.roll_back() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
