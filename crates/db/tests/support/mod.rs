#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use warehouse_db::{Db, Value};

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub fn insert_generic_job(db: &Db, resource: &str, job_id: i64, end_time: i64, date_key: &str) {
    db.execute(
        r#"
        INSERT INTO shredded_job (
          source_format, date_key, job_id, resource_name, start_time, end_time,
          submission_time, wall_time, wait_time, node_count, cpu_count
        ) VALUES ('slurm', ?1, ?2, ?3, ?4, ?5, ?4, 100, 0, 1, 1)
        "#,
        &[
            text(date_key),
            Value::Integer(job_id),
            text(resource),
            Value::Integer(end_time - 100),
            Value::Integer(end_time),
        ],
    )
    .expect("insert generic job");
}

pub fn count_rows(db: &Db, table: &str) -> i64 {
    db.query_scalar_i64(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .expect("count rows")
        .unwrap_or(0)
}
