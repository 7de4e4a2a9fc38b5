use tracing::debug;

use crate::Db;
use crate::error::Result;

const MIGRATION_0001: &str = include_str!("../migrations/0001_shredded.sql");
const MIGRATION_0002: &str = include_str!("../migrations/0002_staging.sql");
const MIGRATION_0003: &str = include_str!("../migrations/0003_hpcdb.sql");
const MIGRATION_0004: &str = include_str!("../migrations/0004_warehouse.sql");
const MIGRATION_0005: &str = include_str!("../migrations/0005_sge.sql");

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_shredded", MIGRATION_0001),
    ("0002_staging", MIGRATION_0002),
    ("0003_hpcdb", MIGRATION_0003),
    ("0004_warehouse", MIGRATION_0004),
    ("0005_sge", MIGRATION_0005),
];

impl Db {
    /// Creates every table the pipeline writes to. Safe to run repeatedly.
    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (name, sql) in MIGRATIONS {
            debug!(migration = name, "applying migration");
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }
}
