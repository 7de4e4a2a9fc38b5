use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;
use warehouse_core::AggregationUnit;
use warehouse_db::{Db, Value};

use crate::aggregate::{Aggregator, JobsRealm, TimeseriesAggregator};
use crate::error::Result;
use crate::params::{LAST_MODIFIED_START_DATE, PipelineParams};
use crate::pipeline::{EtlAction, Section, SqlAction, SqlPipeline};

pub const STAGING_INGEST_COMMON: &str = "staging-ingest-common";
pub const STAGING_INGEST_JOBS: &str = "staging-ingest-jobs";
pub const HPCDB_INGEST_COMMON: &str = "hpcdb-ingest-common";
pub const HPCDB_INGEST_JOBS: &str = "hpcdb-ingest-jobs";
pub const HPCDB_PREP_BY_NEW_JOBS: &str = "hpcdb-prep-xdw-job-ingest-by-new-jobs";
pub const HPCDB_PREP_BY_DATE_RANGE: &str = "hpcdb-prep-xdw-job-ingest-by-date-range";
pub const HPCDB_XDW_INGEST_COMMON: &str = "hpcdb-xdw-ingest-common";
pub const HPCDB_XDW_INGEST_JOBS: &str = "hpcdb-xdw-ingest-jobs";
pub const JOBS_XDW_AGGREGATE: &str = "jobs-xdw-aggregate";

const STAGING_RESOURCES: &str = r#"
INSERT OR IGNORE INTO staging_resource (resource_name)
SELECT DISTINCT resource_name FROM shredded_job ORDER BY resource_name
"#;

const STAGING_PEOPLE: &str = r#"
INSERT OR IGNORE INTO staging_person (user_name)
SELECT DISTINCT user_name FROM shredded_job WHERE user_name IS NOT NULL ORDER BY user_name
"#;

const STAGING_PIS: &str = r#"
INSERT OR IGNORE INTO staging_pi (pi_name)
SELECT DISTINCT pi_name FROM shredded_job WHERE pi_name IS NOT NULL ORDER BY pi_name
"#;

const STAGING_JOBS: &str = r#"
INSERT OR IGNORE INTO staging_job (
  shredded_job_id, source_format, resource_name, user_name, pi_name, queue_name,
  job_id, job_array_index, job_name, start_time, end_time, submission_time,
  eligible_time, wall_time, wait_time, node_count, cpu_count, gpu_count,
  exit_code, exit_state, date_key
)
SELECT
  shredded_job_id, source_format, resource_name, user_name, pi_name, queue_name,
  job_id, IFNULL(job_array_index, -1), job_name, start_time, end_time, submission_time,
  eligible_time, wall_time, wait_time, node_count, cpu_count, gpu_count,
  exit_code, exit_state, date_key
FROM shredded_job
ORDER BY shredded_job_id
"#;

const HPCDB_RESOURCES: &str = r#"
INSERT OR IGNORE INTO hpcdb_resources (code)
SELECT resource_name FROM staging_resource ORDER BY resource_id
"#;

const HPCDB_PEOPLE: &str = r#"
INSERT OR IGNORE INTO hpcdb_people (username)
SELECT user_name FROM staging_person
UNION
SELECT pi_name FROM staging_pi
"#;

const HPCDB_JOBS: &str = r#"
INSERT OR IGNORE INTO hpcdb_jobs (
  resource_id, person_id, pi_person_id, queue, local_jobid, local_job_array_index,
  jobname, start_time, end_time, submit_time, eligible_time, wallduration,
  nodecount, processors, gpucount, exit_code, exit_state, ts
)
SELECT
  r.resource_id, u.person_id, p.person_id, IFNULL(j.queue_name, 'NA'), j.job_id,
  j.job_array_index, j.job_name, j.start_time, j.end_time, j.submission_time,
  j.eligible_time, j.wall_time, j.node_count, j.cpu_count, j.gpu_count,
  j.exit_code, j.exit_state, datetime('now')
FROM staging_job j
JOIN hpcdb_resources r ON r.code = j.resource_name
LEFT JOIN hpcdb_people u ON u.username = j.user_name
LEFT JOIN hpcdb_people p ON p.username = j.pi_name
ORDER BY j.staging_job_id
"#;

const CLEAR_JOBS_TO_INGEST: &str = "DELETE FROM hpcdb_jobs_to_ingest";

const PREP_NEW_JOBS: &str = r#"
INSERT INTO hpcdb_jobs_to_ingest (job_id)
SELECT job_id FROM hpcdb_jobs
WHERE job_id NOT IN (SELECT job_id FROM jobfact)
"#;

// Either bound may be absent, leaving that side of the range open.
const PREP_DATE_RANGE: &str = r#"
INSERT INTO hpcdb_jobs_to_ingest (job_id)
SELECT job_id FROM hpcdb_jobs
WHERE (:start_date IS NULL OR end_time >= CAST(strftime('%s', :start_date) AS INTEGER))
  AND (:end_date IS NULL OR end_time <= CAST(strftime('%s', :end_date) AS INTEGER))
"#;

const XDW_RESOURCES: &str = r#"
INSERT INTO resourcefact (id, code)
SELECT resource_id, code FROM hpcdb_resources WHERE true
ON CONFLICT (id) DO UPDATE SET code = excluded.code
"#;

const XDW_PEOPLE: &str = r#"
INSERT INTO person (id, username)
SELECT person_id, username FROM hpcdb_people WHERE true
ON CONFLICT (id) DO UPDATE SET username = excluded.username
"#;

// A missing submit time falls back to the eligible then start time. Jobs
// without start and end times cannot be placed in time and stay out of the
// fact table.
const XDW_JOBS: &str = r#"
INSERT INTO jobfact (
  job_id, resource_id, person_id, pi_person_id, queue_id, local_jobid,
  local_job_array_index, name, start_time_ts, end_time_ts, submit_time_ts,
  eligible_time_ts, wallduration, waitduration, nodecount, processors, gpucount,
  cpu_time, node_time, last_modified
)
SELECT
  j.job_id, j.resource_id, IFNULL(j.person_id, 0), IFNULL(j.pi_person_id, 0), j.queue,
  j.local_jobid, j.local_job_array_index, j.jobname, j.start_time, j.end_time,
  COALESCE(j.submit_time, j.eligible_time, j.start_time), j.eligible_time,
  IFNULL(j.wallduration, 0),
  MAX(j.start_time - COALESCE(j.submit_time, j.eligible_time, j.start_time), 0),
  IFNULL(j.nodecount, 0),
  IFNULL(j.processors, 0), j.gpucount,
  IFNULL(j.wallduration, 0) * IFNULL(j.processors, 0),
  IFNULL(j.wallduration, 0) * IFNULL(j.nodecount, 0),
  datetime('now')
FROM hpcdb_jobs j
JOIN hpcdb_jobs_to_ingest t ON t.job_id = j.job_id
WHERE j.start_time IS NOT NULL AND j.end_time IS NOT NULL
ON CONFLICT (job_id) DO UPDATE SET
  resource_id = excluded.resource_id,
  person_id = excluded.person_id,
  pi_person_id = excluded.pi_person_id,
  queue_id = excluded.queue_id,
  name = excluded.name,
  start_time_ts = excluded.start_time_ts,
  end_time_ts = excluded.end_time_ts,
  submit_time_ts = excluded.submit_time_ts,
  eligible_time_ts = excluded.eligible_time_ts,
  wallduration = excluded.wallduration,
  waitduration = excluded.waitduration,
  nodecount = excluded.nodecount,
  processors = excluded.processors,
  gpucount = excluded.gpucount,
  cpu_time = excluded.cpu_time,
  node_time = excluded.node_time,
  last_modified = excluded.last_modified
"#;

const MODIFIED_JOB_RANGE: &str = r#"
SELECT MIN(start_time_ts) AS min_start, MAX(end_time_ts) AS max_end
FROM jobfact
WHERE last_modified >= :last_modified_start_date
"#;

impl SqlPipeline {
    /// Pipeline with every section the warehouse initializer uses.
    pub fn standard(units: &[AggregationUnit], aggregate_schema: &str) -> Self {
        SqlPipeline::new()
            .section(
                Section::new(STAGING_INGEST_COMMON)
                    .action(SqlAction::new("StagingResources", &[STAGING_RESOURCES]))
                    .action(SqlAction::new("StagingPeople", &[STAGING_PEOPLE, STAGING_PIS])),
            )
            .section(
                Section::new(STAGING_INGEST_JOBS)
                    .action(SqlAction::new("StagingJobs", &[STAGING_JOBS])),
            )
            .section(
                Section::new(HPCDB_INGEST_COMMON)
                    .action(SqlAction::new("HpcdbResources", &[HPCDB_RESOURCES]))
                    .action(SqlAction::new("HpcdbPeople", &[HPCDB_PEOPLE])),
            )
            .section(
                Section::new(HPCDB_INGEST_JOBS).action(SqlAction::new("HpcdbJobs", &[HPCDB_JOBS])),
            )
            .section(Section::new(HPCDB_PREP_BY_NEW_JOBS).action(SqlAction::new(
                "JobsToIngestByNewJobs",
                &[CLEAR_JOBS_TO_INGEST, PREP_NEW_JOBS],
            )))
            .section(Section::new(HPCDB_PREP_BY_DATE_RANGE).action(SqlAction::new(
                "JobsToIngestByDateRange",
                &[CLEAR_JOBS_TO_INGEST, PREP_DATE_RANGE],
            )))
            .section(
                Section::new(HPCDB_XDW_INGEST_COMMON)
                    .action(SqlAction::new("ResourceFact", &[XDW_RESOURCES]))
                    .action(SqlAction::new("Person", &[XDW_PEOPLE])),
            )
            .section(Section::new(HPCDB_XDW_INGEST_JOBS).action(SqlAction::new(
                "JobFact",
                &[XDW_JOBS, CLEAR_JOBS_TO_INGEST],
            )))
            .section(
                Section::new(JOBS_XDW_AGGREGATE)
                    .action(JobsAggregateAction::new(units.to_vec(), aggregate_schema)),
            )
    }
}

/// Re-aggregates the span of jobs modified since `last-modified-start-date`,
/// overwriting every configured unit.
pub struct JobsAggregateAction {
    units: Vec<AggregationUnit>,
    aggregate_schema: String,
}

impl JobsAggregateAction {
    pub fn new(units: Vec<AggregationUnit>, aggregate_schema: impl Into<String>) -> Self {
        Self {
            units,
            aggregate_schema: aggregate_schema.into(),
        }
    }

    fn modified_range(db: &Db, params: &PipelineParams) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let watermark = params
            .get(LAST_MODIFIED_START_DATE)
            .map(|value| Value::Text(value.to_string()))
            .unwrap_or(Value::Null);
        let rows = db.query_named(
            MODIFIED_JOB_RANGE,
            &[("last_modified_start_date", watermark)],
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let (Some(min_start), Some(max_end)) = (row.get_i64("min_start"), row.get_i64("max_end"))
        else {
            return Ok(None);
        };
        Ok(date_of(min_start).zip(date_of(max_end)))
    }
}

impl EtlAction for JobsAggregateAction {
    fn name(&self) -> &str {
        "JobsAggregate"
    }

    fn required_params(&self) -> &[&'static str] {
        &[LAST_MODIFIED_START_DATE]
    }

    fn execute(&self, db: &mut Db, params: &PipelineParams) -> Result<()> {
        let Some((start, end)) = Self::modified_range(db, params)? else {
            info!(
                watermark = params.get(LAST_MODIFIED_START_DATE),
                "No modified jobs to aggregate"
            );
            return Ok(());
        };
        for unit in &self.units {
            TimeseriesAggregator::new(JobsRealm, *unit).execute(
                db,
                &self.aggregate_schema,
                start,
                end,
                false,
            )?;
        }
        Ok(())
    }
}

fn date_of(ts: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}
