#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use warehouse_core::{ResourceCatalog, ResourceConfig};
use warehouse_db::{Db, Row};

pub const SLURM_LINE: &str = "4103947|4103947|ub-hpc|general-compute|normal|anon|anon|918273|unknown|192837|2015-06-26T13:57:00|2015-06-26T13:57:00|2015-06-28T02:55:50|2015-07-01T02:55:50|3-00:00:00|1:0|TIMEOUT|32|256|256|3000Mc|||3-00:00:00|d07n07s[01-02],d07n08s[01-02]|1AbC-2-3";

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

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn catalog() -> ResourceCatalog {
    let mut pi_by_account = ResourceConfig::new("rush");
    pi_by_account.pi_column = Some("account_name".to_string());
    let mut filtered = ResourceConfig::new("filtered");
    filtered.host_filter = Some("^d07n08".to_string());
    ResourceCatalog::new(vec![
        ResourceConfig::new("frearson"),
        ResourceConfig::new("edge"),
        ResourceConfig::new("lsfcluster"),
        ResourceConfig::new("sgecluster"),
        pi_by_account,
        filtered,
    ])
}

pub fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).expect("write file");
    path
}

pub fn rows(db: &Db, sql: &str) -> Vec<Row> {
    db.query(sql, &[]).expect("query rows")
}

pub fn count_rows(db: &Db, table: &str) -> i64 {
    db.query_scalar_i64(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .expect("count rows")
        .unwrap_or(0)
}
