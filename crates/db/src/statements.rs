use rusqlite::{OptionalExtension, ToSql, params_from_iter};
use tracing::debug;

use crate::Db;
use crate::error::Result;
use crate::helpers::{bind_named, compact_sql, for_each_row, positional_names, read_rows};
use crate::recorder::display_params;
use crate::types::{RecordedQuery, Row, Value};

impl Db {
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.trace(sql, display_params(positional_names(params)));
        let mut stmt = self.conn.prepare_cached(sql)?;
        read_rows(&mut stmt, params_from_iter(params.iter()))
    }

    pub fn query_named(&self, sql: &str, params: &[(&str, Value)]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let bound = bind_named(&stmt, params)?;
        self.trace(
            sql,
            display_params(bound.iter().map(|(name, value)| (name.clone(), *value))),
        );
        let refs: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), *value as &dyn ToSql))
            .collect();
        read_rows(&mut stmt, refs.as_slice())
    }

    /// Like [`Db::query_named`], but rows are passed to `f` one at a time
    /// instead of being collected. Returns the number of rows read.
    pub fn for_each_named<F>(&self, sql: &str, params: &[(&str, Value)], f: F) -> Result<usize>
    where
        F: FnMut(Row) -> Result<()>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let bound = bind_named(&stmt, params)?;
        self.trace(
            sql,
            display_params(bound.iter().map(|(name, value)| (name.clone(), *value))),
        );
        let refs: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), *value as &dyn ToSql))
            .collect();
        for_each_row(&mut stmt, refs.as_slice(), f)
    }

    /// First column of the first row, if it is an integer.
    pub fn query_scalar_i64(&self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        self.trace(sql, display_params(positional_names(params)));
        let mut stmt = self.conn.prepare_cached(sql)?;
        let value = stmt
            .query_row(params_from_iter(params.iter()), |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.trace(sql, display_params(positional_names(params)));
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter()))?)
    }

    pub fn execute_named(&self, sql: &str, params: &[(&str, Value)]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let bound = bind_named(&stmt, params)?;
        self.trace(
            sql,
            display_params(bound.iter().map(|(name, value)| (name.clone(), *value))),
        );
        let refs: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), *value as &dyn ToSql))
            .collect();
        Ok(stmt.execute(refs.as_slice())?)
    }

    /// Runs `sql` and returns the rowid of the inserted row.
    pub fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.trace(sql, Vec::new());
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Current time according to the database, `YYYY-MM-DD HH:MM:SS` UTC.
    pub fn now(&self) -> Result<String> {
        let now = self
            .conn
            .query_row("SELECT datetime('now')", [], |row| row.get::<_, String>(0))?;
        Ok(now)
    }

    pub fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            crate::quote_identifier(schema)
        );
        let count: i64 = self.conn.query_row(&sql, [table], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn trace(&self, sql: &str, params: Vec<(String, String)>) {
        let sql = compact_sql(sql);
        debug!(sql = %sql, params = ?params, "executing statement");
        if let Some(recorder) = &self.recorder {
            recorder.record(RecordedQuery { sql, params });
        }
    }
}
