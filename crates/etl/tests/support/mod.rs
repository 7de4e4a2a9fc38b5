#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use tempfile::TempDir;
use warehouse_db::{Db, DbError, Row, Value};
use warehouse_etl::{PipelineError, PipelineParams, PipelineRunner, Result};

pub struct TestDb {
    pub dir: TempDir,
    pub db: Db,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = Db::open(dir.path().join("warehouse.sqlite")).expect("open db");
    db.migrate().expect("migrate db");
    TestDb { dir, db }
}

pub fn ingest_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../ingest/tests/fixtures")
        .join(name)
}

pub fn ts(value: &str) -> i64 {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .expect("timestamp")
        .and_utc()
        .timestamp()
}

pub struct FactJob<'a> {
    pub job_id: i64,
    pub resource_id: i64,
    pub person_id: i64,
    pub queue: &'a str,
    pub submit: &'a str,
    pub start: &'a str,
    pub end: &'a str,
    pub processors: i64,
    pub nodes: i64,
}

impl Default for FactJob<'_> {
    fn default() -> Self {
        Self {
            job_id: 1,
            resource_id: 1,
            person_id: 1,
            queue: "normal",
            submit: "2024-01-31 11:00:00",
            start: "2024-01-31 12:00:00",
            end: "2024-02-01 12:00:00",
            processors: 2,
            nodes: 1,
        }
    }
}

pub fn insert_fact(db: &Db, job: FactJob<'_>) {
    let (submit, start, end) = (ts(job.submit), ts(job.start), ts(job.end));
    db.execute(
        r#"
        INSERT INTO jobfact (
          job_id, resource_id, person_id, pi_person_id, queue_id, local_jobid,
          start_time_ts, end_time_ts, submit_time_ts, wallduration, waitduration,
          nodecount, processors, cpu_time, node_time, last_modified
        ) VALUES (?1, ?2, ?3, ?3, ?4, ?1, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, datetime('now'))
        "#,
        &[
            Value::Integer(job.job_id),
            Value::Integer(job.resource_id),
            Value::Integer(job.person_id),
            Value::Text(job.queue.to_string()),
            Value::Integer(start),
            Value::Integer(end),
            Value::Integer(submit),
            Value::Integer(end - start),
            Value::Integer(start - submit),
            Value::Integer(job.nodes),
            Value::Integer(job.processors),
            Value::Integer((end - start) * job.processors),
            Value::Integer((end - start) * job.nodes),
        ],
    )
    .expect("insert fact");
}

pub fn rows(db: &Db, sql: &str) -> Vec<Row> {
    db.query(sql, &[]).expect("query rows")
}

pub fn scalar(db: &Db, sql: &str) -> i64 {
    db.query_scalar_i64(sql, &[])
        .expect("scalar query")
        .unwrap_or(0)
}

pub fn count_rows(db: &Db, table: &str) -> i64 {
    scalar(db, &format!("SELECT COUNT(*) FROM {}", table))
}

/// Runner that records each call instead of executing anything.
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: Vec<(Vec<String>, Vec<(String, String)>)>,
    /// Section whose call is recorded and then fails.
    pub fail_on: Option<&'static str>,
    /// Section during which the runner sleeps, to let the database clock move.
    pub pause_on: Option<(&'static str, Duration)>,
}

impl RecordingRunner {
    pub fn failing_on(section: &'static str) -> Self {
        Self {
            fail_on: Some(section),
            ..Self::default()
        }
    }

    pub fn pausing_on(section: &'static str, pause: Duration) -> Self {
        Self {
            pause_on: Some((section, pause)),
            ..Self::default()
        }
    }

    pub fn sections(&self) -> Vec<Vec<String>> {
        self.calls.iter().map(|(sections, _)| sections.clone()).collect()
    }
}

impl PipelineRunner for RecordingRunner {
    fn run(&mut self, _db: &mut Db, sections: &[&str], params: &PipelineParams) -> Result<()> {
        self.calls.push((
            sections.iter().map(|name| name.to_string()).collect(),
            params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        ));
        if let Some((section, pause)) = self.pause_on
            && sections.contains(&section)
        {
            std::thread::sleep(pause);
        }
        match self.fail_on {
            Some(failing) if sections.contains(&failing) => Err(PipelineError::Stage {
                section: failing.to_string(),
                action: "Recorded".to_string(),
                source: Box::new(PipelineError::Db(DbError::Duplicate(failing.to_string()))),
            }),
            _ => Ok(()),
        }
    }
}
