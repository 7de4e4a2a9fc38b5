use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::{debug, info};
use warehouse_core::{ConfigError, FieldValue, JobErrorRecord, ResourceCatalog, ShreddedRecord};
use warehouse_db::{Db, Value, quote_identifier};

use crate::format::{ColumnMap, Format, ParseState};
use crate::ingestor::{DeleteDirective, IncrementalIngestor};
use crate::parsed::Parsed;
use crate::types::{Result, ShredStats};
use crate::slurm_json;
use crate::validate::check_job_data;

pub const GENERIC_TABLE: &str = "shredded_job";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShredderOptions {
    /// Raise zero or inconsistent node/cpu counts instead of only reporting
    /// them.
    pub repair_node_cpu_counts: bool,
}

/// Parses accounting log lines of one format into its staging table.
///
/// The staging table's largest primary key is captured when the shredder is
/// built; [`Shredder::job_ingestor`] later copies only rows above it.
pub struct Shredder<'db> {
    pub(crate) db: &'db mut Db,
    format: Format,
    high_water_mark: i64,
    resource: Option<String>,
    column_map: ColumnMap,
    host_filter: Option<Regex>,
    options: ShredderOptions,
    parse_state: ParseState,
    pub(crate) job_errors: Vec<JobErrorRecord>,
    pub(crate) stats: ShredStats,
}

impl<'db> Shredder<'db> {
    pub fn new(db: &'db mut Db, format: Format) -> Result<Self> {
        let high_water_mark = db.max_primary_key(format.table_name(), format.primary_key())?;
        debug!(format = %format, high_water_mark, "Created shredder");
        Ok(Self {
            db,
            format,
            high_water_mark,
            resource: None,
            column_map: format.column_map(None)?,
            host_filter: None,
            options: ShredderOptions::default(),
            parse_state: ParseState::default(),
            job_errors: Vec::new(),
            stats: ShredStats::default(),
        })
    }

    /// Builds a shredder from a format name such as `slurm` or `torque`.
    pub fn for_format(db: &'db mut Db, name: &str) -> Result<Self> {
        Self::new(db, Format::from_name(name)?)
    }

    pub fn with_options(mut self, options: ShredderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn high_water_mark(&self) -> i64 {
        self.high_water_mark
    }

    pub fn stats(&self) -> ShredStats {
        self.stats
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Sets the resource every record is attributed to, applying its PI
    /// column and host filter from the catalog.
    pub fn set_resource(&mut self, name: &str, catalog: &ResourceCatalog) -> Result<()> {
        let config = catalog.lookup(name)?;
        self.column_map = self.format.column_map(config.pi_column.as_deref())?;
        self.host_filter = None;
        if let Some(pattern) = config.host_filter.as_deref() {
            self.set_host_filter(pattern)?;
        }
        self.resource = Some(name.to_string());
        debug!(resource = name, "Set shredder resource");
        Ok(())
    }

    pub fn set_host_filter(&mut self, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|err| ConfigError::InvalidHostFilter {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        self.host_filter = Some(regex);
        Ok(())
    }

    pub fn has_host_filter(&self) -> bool {
        self.host_filter.is_some()
    }

    /// True when no filter is set or the host matches it.
    pub fn test_host_filter(&self, host: Option<&str>) -> bool {
        let Some(filter) = &self.host_filter else {
            return true;
        };
        let allowed = host.is_some_and(|host| filter.is_match(host));
        debug!(?host, allowed, "Applied host filter");
        allowed
    }

    /// Parses one line and stores the job(s) it describes. Lines that carry
    /// no finished job are skipped silently.
    pub fn shred_line(&mut self, line: &str) -> Result<()> {
        debug!(line, "Shredding line");
        let parsed = self.format.parse_line(line, &mut self.parse_state)?;
        self.store(line, parsed)
    }

    /// Stores one job object of a `sacct --json` document.
    pub(crate) fn shred_json_job(&mut self, input: &str, job: &serde_json::Value) -> Result<()> {
        let parsed = slurm_json::parse_job(job, &mut self.parse_state)?;
        self.store(input, parsed)
    }

    fn store(&mut self, input: &str, parsed: Parsed) -> Result<()> {
        let job = match parsed {
            Parsed::Skip(reason) => {
                debug!(reason = %reason, "Skipping line");
                return Ok(());
            }
            Parsed::Job(job) => job,
        };

        let host = job.first_host.as_deref();
        if (host.is_some() || self.format.filters_hostless_jobs()) && !self.test_host_filter(host)
        {
            debug!("Skipping line due to host filter");
            return Ok(());
        }

        let mut record = job.record;
        if let Some(resource) = &self.resource {
            record.set(self.format.resource_column(), resource.as_str());
        }

        self.check_job_data(input, &mut record);

        if job.array_indexes.is_empty() {
            self.insert_row(&record)?;
        } else {
            for index in job.array_indexes {
                record.set("job_array_index", index);
                self.insert_row(&record)?;
            }
        }
        Ok(())
    }

    /// Validates times and counts, repairing what can be repaired and
    /// recording the rest against the raw input.
    pub fn check_job_data(&mut self, input: &str, record: &mut ShreddedRecord) {
        let map = self.format.data_map();
        let messages = check_job_data(record, map, self.options.repair_node_cpu_counts);
        if messages.is_empty() {
            return;
        }
        let job_id = record.get(map.job_id).map(FieldValue::to_string);
        debug!(job_id = ?job_id, ?messages, "Job data has errors");
        self.job_errors.push(JobErrorRecord {
            job_id,
            input: input.to_string(),
            messages,
        });
    }

    /// Inserts the staging columns present in `record`.
    pub fn insert_row(&mut self, record: &ShreddedRecord) -> Result<i64> {
        let columns = self.format.columns();
        let (names, values): (Vec<String>, Vec<Value>) = record
            .iter()
            .filter(|(key, _)| columns.contains(key))
            .map(|(key, value)| (quote_identifier(key), to_sql_value(value)))
            .unzip();
        let placeholders = (1..=values.len())
            .map(|idx| format!("?{}", idx))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.format.table_name(),
            names.join(", "),
            placeholders
        );
        Ok(self.db.insert(&sql, &values)?)
    }

    /// Empties the staging table; the next ingest starts from zero.
    pub fn truncate(&mut self) -> Result<()> {
        info!(table = self.format.table_name(), "Truncating staging table");
        self.db.truncate_table(self.format.table_name())?;
        self.high_water_mark = 0;
        Ok(())
    }

    pub fn job_max_date(&self) -> Result<Option<NaiveDate>> {
        info!("Querying for maximum end date");
        Ok(self.db.job_max_date(self.resource.as_deref())?)
    }

    pub fn job_max_datetime(&self) -> Result<Option<NaiveDateTime>> {
        info!("Querying for maximum end datetime");
        Ok(self.db.job_max_datetime(self.resource.as_deref())?)
    }

    /// Ingestor copying staged rows into the generic job table. With
    /// `ingest_all` the format's generic rows are rebuilt from the whole
    /// staging table, otherwise only rows staged after construction move.
    pub fn job_ingestor(&self, ingest_all: bool) -> IncrementalIngestor {
        let filter = if ingest_all {
            "1 = 1".to_string()
        } else {
            format!(
                "{} > {}",
                quote_identifier(self.format.primary_key()),
                self.high_water_mark
            )
        };
        let mut source_query = format!(
            "SELECT\n  {},\n  :source_format AS \"source_format\"\nFROM {}\nWHERE {}",
            self.column_map.select_list(),
            self.format.table_name(),
            filter
        );
        if let Some(suffix) = self.format.ingest_suffix() {
            source_query.push('\n');
            source_query.push_str(suffix);
        }
        let mut insert_fields: Vec<String> = self
            .column_map
            .generic_columns()
            .map(str::to_string)
            .collect();
        insert_fields.push("source_format".to_string());

        let format_param = vec![(
            "source_format".to_string(),
            Value::Text(self.format.source_format().to_string()),
        )];
        let delete = if ingest_all {
            DeleteDirective::Statement {
                sql: format!("DELETE FROM {} WHERE source_format = :source_format", GENERIC_TABLE),
                params: format_param.clone(),
            }
        } else {
            DeleteDirective::Retain
        };
        debug!(source_query = %source_query, "Ingestor source query");

        IncrementalIngestor::new(source_query, GENERIC_TABLE, insert_fields)
            .with_params(format_param)
            .with_delete(delete)
    }

    pub fn db(&mut self) -> &mut Db {
        &mut *self.db
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Int(value) => Value::Integer(*value),
        FieldValue::Real(value) => Value::Real(*value),
        FieldValue::Text(value) => Value::Text(value.clone()),
    }
}
