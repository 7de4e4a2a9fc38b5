use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::helpers::quote_identifier;
use crate::types::Value;
use crate::Db;

impl Db {
    /// Largest primary key currently in `table`, 0 when empty.
    pub fn max_primary_key(&self, table: &str, pk: &str) -> Result<i64> {
        let sql = format!(
            "SELECT MAX({}) AS max_pk FROM {}",
            quote_identifier(pk),
            quote_identifier(table)
        );
        Ok(self.query_scalar_i64(&sql, &[])?.unwrap_or(0))
    }

    pub fn truncate_table(&self, table: &str) -> Result<usize> {
        self.execute(&format!("DELETE FROM {}", quote_identifier(table)), &[])
    }

    /// Latest job end date in the generic job table.
    pub fn job_max_date(&self, resource: Option<&str>) -> Result<Option<NaiveDate>> {
        let rows = match resource {
            Some(resource) => self.query(
                "SELECT MAX(date_key) AS max_date FROM shredded_job WHERE resource_name = ?1",
                &[Value::Text(resource.to_string())],
            )?,
            None => self.query("SELECT MAX(date_key) AS max_date FROM shredded_job", &[])?,
        };
        let Some(value) = rows.first().and_then(|row| row.get_text("max_date")) else {
            return Ok(None);
        };
        Ok(Some(NaiveDate::parse_from_str(&value, "%Y-%m-%d")?))
    }

    /// Latest job end time in the generic job table, UTC.
    pub fn job_max_datetime(&self, resource: Option<&str>) -> Result<Option<NaiveDateTime>> {
        let max_end = match resource {
            Some(resource) => self.query_scalar_i64(
                "SELECT MAX(end_time) FROM shredded_job WHERE resource_name = ?1",
                &[Value::Text(resource.to_string())],
            )?,
            None => self.query_scalar_i64("SELECT MAX(end_time) FROM shredded_job", &[])?,
        };
        Ok(max_end
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.naive_utc()))
    }
}
