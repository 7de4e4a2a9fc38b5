use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};
use warehouse_core::{AggregationUnit, TimePeriod};
use warehouse_db::{Db, Value, quote_identifier};

use crate::error::Result;
use crate::filters::FilterListBuilder;

/// A dimension column of a realm's rollup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub name: &'static str,
    pub sql_type: &'static str,
}

/// Realm-specific aggregation rules.
///
/// The bucket query decides how a job that straddles a bucket boundary is
/// attributed. It is bound with `:period_start_ts`, `:period_end_ts` (last
/// second of the bucket) and `:period_seconds`, and must return one column per
/// dimension and metric, grouped by the dimensions.
pub trait Realm {
    fn name(&self) -> &str;
    fn table_prefix(&self) -> &str;
    fn dimensions(&self) -> &[Dimension];
    fn metrics(&self) -> &[&'static str];
    fn bucket_query(&self) -> &str;
}

pub struct JobsRealm;

const JOB_DIMENSIONS: &[Dimension] = &[
    Dimension {
        name: "resource_id",
        sql_type: "INTEGER",
    },
    Dimension {
        name: "person_id",
        sql_type: "INTEGER",
    },
    Dimension {
        name: "pi_person_id",
        sql_type: "INTEGER",
    },
    Dimension {
        name: "queue_id",
        sql_type: "TEXT",
    },
];

const JOB_METRICS: &[&str] = &[
    "job_count",
    "started_job_count",
    "submitted_job_count",
    "running_job_count",
    "wallduration",
    "waitduration",
    "cpu_time",
    "node_time",
];

// Time is split across buckets by overlap, so summing a job over every bucket
// gives back its full wall time. Wait time counts in the bucket the job
// started in.
const JOB_BUCKET_QUERY: &str = r#"
SELECT
  resource_id,
  person_id,
  pi_person_id,
  queue_id,
  SUM(CASE WHEN end_time_ts BETWEEN :period_start_ts AND :period_end_ts THEN 1 ELSE 0 END) AS job_count,
  SUM(CASE WHEN start_time_ts BETWEEN :period_start_ts AND :period_end_ts THEN 1 ELSE 0 END) AS started_job_count,
  SUM(CASE WHEN submit_time_ts BETWEEN :period_start_ts AND :period_end_ts THEN 1 ELSE 0 END) AS submitted_job_count,
  SUM(CASE WHEN start_time_ts <= :period_end_ts AND end_time_ts >= :period_start_ts THEN 1 ELSE 0 END) AS running_job_count,
  SUM(overlap) AS wallduration,
  SUM(CASE WHEN start_time_ts BETWEEN :period_start_ts AND :period_end_ts THEN waitduration ELSE 0 END) AS waitduration,
  SUM(overlap * processors) AS cpu_time,
  SUM(overlap * nodecount) AS node_time
FROM (
  SELECT
    *,
    MAX(MIN(end_time_ts, :period_end_ts + 1) - MAX(start_time_ts, :period_start_ts), 0) AS overlap
  FROM jobfact
  WHERE (start_time_ts <= :period_end_ts AND end_time_ts >= :period_start_ts)
     OR submit_time_ts BETWEEN :period_start_ts AND :period_end_ts
)
GROUP BY resource_id, person_id, pi_person_id, queue_id
"#;

impl Realm for JobsRealm {
    fn name(&self) -> &str {
        "Jobs"
    }

    fn table_prefix(&self) -> &str {
        "jobfact"
    }

    fn dimensions(&self) -> &[Dimension] {
        JOB_DIMENSIONS
    }

    fn metrics(&self) -> &[&'static str] {
        JOB_METRICS
    }

    fn bucket_query(&self) -> &str {
        JOB_BUCKET_QUERY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub buckets: usize,
    pub rows: usize,
}

/// Something that rolls warehouse facts up by time.
pub trait Aggregator {
    fn unit(&self) -> AggregationUnit;

    fn execute(
        &self,
        db: &mut Db,
        aggregate_schema: &str,
        start: NaiveDate,
        end: NaiveDate,
        append: bool,
    ) -> Result<AggregateStats>;

    fn update_filters(&self, db: &mut Db, aggregate_schema: &str) -> Result<()>;
}

/// Rolls a realm's facts into `{prefix}_by_{unit}` tables, one bucket at a
/// time.
pub struct TimeseriesAggregator<R> {
    realm: R,
    unit: AggregationUnit,
}

impl<R: Realm> TimeseriesAggregator<R> {
    pub fn new(realm: R, unit: AggregationUnit) -> Self {
        Self { realm, unit }
    }

    pub fn realm(&self) -> &R {
        &self.realm
    }

    pub fn table_name(&self) -> String {
        table_name(self.realm.table_prefix(), self.unit)
    }

    fn qualified_table(&self, schema: &str) -> String {
        format!(
            "{}.{}",
            quote_identifier(schema),
            quote_identifier(&self.table_name())
        )
    }

    fn period_column(&self) -> String {
        format!("{}_id", self.unit.as_str())
    }

    /// Time columns with the parameter each is filled from. Yearly tables have
    /// no separate period-in-year column.
    fn time_columns(&self) -> Vec<(String, &'static str)> {
        let mut columns = vec![
            (self.period_column(), ":period_id"),
            ("year".to_string(), ":year"),
        ];
        if self.unit != AggregationUnit::Year {
            columns.push((self.unit.as_str().to_string(), ":period_in_year"));
        }
        columns
    }

    fn key_columns(&self) -> Vec<String> {
        std::iter::once(self.period_column())
            .chain(self.realm.dimensions().iter().map(|d| d.name.to_string()))
            .collect()
    }

    pub fn create_table(&self, db: &Db, schema: &str) -> Result<()> {
        let mut columns: Vec<String> = self
            .time_columns()
            .iter()
            .map(|(column, _)| format!("{} INTEGER NOT NULL", quote_identifier(column)))
            .collect();
        for dimension in self.realm.dimensions() {
            columns.push(format!(
                "{} {} NOT NULL",
                quote_identifier(dimension.name),
                dimension.sql_type
            ));
        }
        for metric in self.realm.metrics() {
            columns.push(format!("{} INTEGER NOT NULL DEFAULT 0", quote_identifier(metric)));
        }
        let key = self
            .key_columns()
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {},\n  PRIMARY KEY ({})\n)",
            self.qualified_table(schema),
            columns.join(",\n  "),
            key
        );
        db.execute_batch(&sql)?;
        Ok(())
    }

    fn insert_statement(&self, schema: &str, append: bool) -> String {
        let dimensions: Vec<&str> = self.realm.dimensions().iter().map(|d| d.name).collect();
        let metrics = self.realm.metrics();
        let time_columns = self.time_columns();
        let target_columns = time_columns
            .iter()
            .map(|(column, _)| column.clone())
            .chain(dimensions.iter().chain(metrics.iter()).map(|c| c.to_string()))
            .map(|column| quote_identifier(&column))
            .collect::<Vec<_>>()
            .join(", ");
        let source_columns = time_columns
            .iter()
            .map(|(_, param)| param.to_string())
            .chain(
                dimensions
                    .iter()
                    .chain(metrics.iter())
                    .map(|column| format!("bucket.{}", quote_identifier(column))),
            )
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({})\nSELECT {}\nFROM ({}) AS bucket\nWHERE true",
            self.qualified_table(schema),
            target_columns,
            source_columns,
            self.realm.bucket_query()
        );
        if append {
            let key = self
                .key_columns()
                .iter()
                .map(|column| quote_identifier(column))
                .collect::<Vec<_>>()
                .join(", ");
            let updates = metrics
                .iter()
                .map(|metric| {
                    let metric = quote_identifier(metric);
                    format!("{metric} = {metric} + excluded.{metric}")
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nON CONFLICT ({}) DO UPDATE SET {}", key, updates));
        }
        sql
    }

    fn aggregate_period(
        &self,
        db: &mut Db,
        schema: &str,
        period: &TimePeriod,
        append: bool,
    ) -> Result<usize> {
        let params: Vec<(&str, Value)> = vec![
            ("period_id", Value::Integer(period.id)),
            ("year", Value::Integer(i64::from(period.year))),
            ("period_in_year", Value::Integer(i64::from(period.period_in_year))),
            ("period_start_ts", Value::Integer(period.start_ts)),
            ("period_end_ts", Value::Integer(period.end_ts)),
            ("period_seconds", Value::Integer(period.seconds)),
        ];
        let insert = self.insert_statement(schema, append);
        let delete = format!(
            "DELETE FROM {} WHERE {} = :period_id",
            self.qualified_table(schema),
            quote_identifier(&self.period_column())
        );

        within_transaction(db, |db| {
            if !append {
                db.execute_named(&delete, &params)?;
            }
            Ok(db.execute_named(&insert, &params)?)
        })
    }
}

impl<R: Realm> Aggregator for TimeseriesAggregator<R> {
    fn unit(&self) -> AggregationUnit {
        self.unit
    }

    /// Recomputes every bucket of the unit overlapping `start..=end`.
    /// Overwriting is idempotent; appending adds to the stored metrics.
    fn execute(
        &self,
        db: &mut Db,
        aggregate_schema: &str,
        start: NaiveDate,
        end: NaiveDate,
        append: bool,
    ) -> Result<AggregateStats> {
        info!(
            realm = self.realm.name(),
            unit = %self.unit,
            %start,
            %end,
            append,
            "Aggregating"
        );
        self.create_table(db, aggregate_schema)?;

        let mut stats = AggregateStats::default();
        for period in self.unit.periods_between(start, end) {
            let rows = self.aggregate_period(db, aggregate_schema, &period, append)?;
            debug!(period_id = period.id, rows, "Aggregated bucket");
            stats.buckets += 1;
            stats.rows += rows;
        }
        info!(
            unit = %self.unit,
            buckets = stats.buckets,
            rows = stats.rows,
            "Aggregation complete"
        );
        Ok(stats)
    }

    fn update_filters(&self, db: &mut Db, aggregate_schema: &str) -> Result<()> {
        FilterListBuilder::new(aggregate_schema).build_realm_lists(db, &self.realm)
    }
}

pub fn table_name(prefix: &str, unit: AggregationUnit) -> String {
    format!("{}_by_{}", prefix, unit.as_str())
}

/// Each bucket commits on its own unless the caller already holds a
/// transaction, as a pipeline section does.
fn within_transaction<T>(db: &mut Db, f: impl FnOnce(&mut Db) -> Result<T>) -> Result<T> {
    if db.in_transaction() {
        f(db)
    } else {
        db.transaction(f)
    }
}
