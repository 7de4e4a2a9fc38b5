mod support;

use std::time::Duration;

use chrono::NaiveDate;
use ingest::{Format, Shredder};
use support::{
    FactJob, RecordingRunner, count_rows, ingest_fixture, insert_fact, scalar, setup_db,
};
use warehouse_core::{AggregationUnit, ResourceCatalog, ResourceConfig};
use warehouse_etl::{
    InitializerConfig, JobsRealm, PipelineError, SqlPipeline, TimeseriesAggregator,
    WarehouseInitializer,
};

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn ingest_all_runs_stages_in_order() {
    let mut test_db = setup_db();
    let mut runner = RecordingRunner::default();
    WarehouseInitializer::new(&mut test_db.db, &mut runner, InitializerConfig::default())
        .ingest_all(None, None)
        .expect("ingest all");

    assert_eq!(
        runner.sections(),
        vec![
            strings(&["staging-ingest-common", "staging-ingest-jobs"]),
            strings(&["hpcdb-ingest-common", "hpcdb-ingest-jobs"]),
            strings(&["hpcdb-prep-xdw-job-ingest-by-new-jobs"]),
            strings(&["hpcdb-xdw-ingest-common", "hpcdb-xdw-ingest-jobs"]),
            strings(&["jobs-xdw-aggregate"]),
        ]
    );

    let (_, promote_params) = &runner.calls[3];
    let (_, aggregate_params) = &runner.calls[4];
    assert_eq!(promote_params.len(), 1);
    assert_eq!(promote_params[0].0, "last-modified-start-date");
    assert_eq!(aggregate_params, promote_params);
}

#[test]
fn failing_stage_stops_ingest_all() {
    let mut test_db = setup_db();
    let mut runner = RecordingRunner::failing_on("hpcdb-ingest-jobs");
    let err = WarehouseInitializer::new(&mut test_db.db, &mut runner, InitializerConfig::default())
        .ingest_all(None, None)
        .expect_err("staging stage fails");

    assert!(matches!(
        err,
        PipelineError::Stage { ref section, .. } if section == "hpcdb-ingest-jobs"
    ));
    assert_eq!(
        runner.sections(),
        vec![
            strings(&["staging-ingest-common", "staging-ingest-jobs"]),
            strings(&["hpcdb-ingest-common", "hpcdb-ingest-jobs"]),
        ]
    );
    assert!(!test_db.db.table_exists("main", "jobs_person_id_filter_list").expect("exists"));
}

#[test]
fn watermark_is_read_after_prep_section() {
    let mut test_db = setup_db();
    let before = test_db.db.now().expect("now");
    let mut runner = RecordingRunner::pausing_on(
        "hpcdb-prep-xdw-job-ingest-by-new-jobs",
        Duration::from_millis(1_100),
    );
    let watermark =
        WarehouseInitializer::new(&mut test_db.db, &mut runner, InitializerConfig::default())
            .ingest_all_hpcdb(None, None)
            .expect("ingest hpcdb");

    assert!(watermark > before, "{watermark} should follow {before}");
    let (_, promote_params) = &runner.calls[1];
    assert_eq!(promote_params[0].1, watermark);
}

#[test]
fn date_bounds_select_the_date_range_section() {
    let mut test_db = setup_db();
    let mut runner = RecordingRunner::default();
    let watermark = WarehouseInitializer::new(
        &mut test_db.db,
        &mut runner,
        InitializerConfig::default(),
    )
    .ingest_all_hpcdb(Some(date("2024-01-01")), Some(date("2024-01-31")))
    .expect("ingest hpcdb");

    let (sections, params) = &runner.calls[0];
    assert_eq!(sections, &strings(&["hpcdb-prep-xdw-job-ingest-by-date-range"]));
    assert_eq!(
        params,
        &vec![
            ("end-date".to_string(), "2024-01-31 23:59:59".to_string()),
            ("start-date".to_string(), "2024-01-01 00:00:00".to_string()),
        ]
    );
    assert_eq!(runner.calls[1].1[0].1, watermark);
}

#[test]
fn disabled_jobs_realm_skips_every_stage() {
    let mut test_db = setup_db();
    let mut runner = RecordingRunner::default();
    let config = InitializerConfig {
        realms: Vec::new(),
        ..InitializerConfig::default()
    };
    WarehouseInitializer::new(&mut test_db.db, &mut runner, config)
        .ingest_all(None, None)
        .expect("ingest all");
    assert!(runner.calls.is_empty());
}

#[test]
fn direct_aggregation_covers_each_configured_unit() {
    let mut test_db = setup_db();
    insert_fact(&test_db.db, FactJob::default());
    let mut runner = RecordingRunner::default();
    let config = InitializerConfig {
        units: vec![AggregationUnit::Day, AggregationUnit::Year],
        ..InitializerConfig::default()
    };
    let mut built = Vec::new();
    WarehouseInitializer::new(&mut test_db.db, &mut runner, config)
        .aggregate(
            |unit| {
                built.push(unit);
                TimeseriesAggregator::new(JobsRealm, unit)
            },
            date("2024-01-01"),
            date("2024-12-31"),
            false,
        )
        .expect("aggregate");

    assert_eq!(built, vec![AggregationUnit::Day, AggregationUnit::Year]);
    assert!(runner.calls.is_empty());
    assert_eq!(count_rows(&test_db.db, "jobfact_by_day"), 2);
    assert_eq!(count_rows(&test_db.db, "jobfact_by_year"), 1);
    assert!(
        !test_db
            .db
            .table_exists("main", "jobfact_by_month")
            .expect("exists")
    );
    assert_eq!(count_rows(&test_db.db, "jobs_person_id_filter_list"), 1);
}

fn shred_slurm_fixture(db: &mut warehouse_db::Db) {
    let catalog = ResourceCatalog::new(vec![ResourceConfig::new("frearson")]);
    let mut shredder = Shredder::new(db, Format::Slurm).expect("shredder");
    shredder.set_resource("frearson", &catalog).expect("resource");
    shredder
        .shred_file(&ingest_fixture("slurm_sacct.log"))
        .expect("shred fixture");
    shredder.job_ingestor(false).run(shredder.db()).expect("ingest");
}

#[test]
fn shredded_jobs_flow_into_the_warehouse() {
    let mut test_db = setup_db();
    shred_slurm_fixture(&mut test_db.db);

    let config = InitializerConfig::default();
    let mut pipeline = SqlPipeline::standard(&config.units, &config.aggregate_schema);
    WarehouseInitializer::new(&mut test_db.db, &mut pipeline, config)
        .ingest_all(None, None)
        .expect("ingest all");

    let db = &test_db.db;
    assert_eq!(count_rows(db, "staging_job"), 4);
    assert_eq!(count_rows(db, "hpcdb_jobs"), 4);
    assert_eq!(count_rows(db, "jobfact"), 4);
    assert_eq!(count_rows(db, "hpcdb_jobs_to_ingest"), 0);
    assert_eq!(count_rows(db, "resourcefact"), 1);
    assert_eq!(
        scalar(db, "SELECT COUNT(*) FROM jobfact WHERE local_job_array_index >= 0"),
        3
    );
    assert_eq!(
        scalar(db, "SELECT cpu_time FROM jobfact WHERE local_jobid = 4103947"),
        259_200 * 256
    );

    let total = scalar(db, "SELECT SUM(end_time_ts - start_time_ts) FROM jobfact");
    assert_eq!(total, 259_200 + 3 * 5_400);
    for unit in AggregationUnit::ALL {
        assert_eq!(
            scalar(db, &format!("SELECT SUM(wallduration) FROM jobfact_by_{unit}")),
            total,
            "{unit}"
        );
    }
    assert_eq!(count_rows(db, "jobs_resource_id_filter_list"), 1);
}

#[test]
fn repeated_ingest_all_is_idempotent() {
    let mut test_db = setup_db();
    shred_slurm_fixture(&mut test_db.db);

    let config = InitializerConfig::default();
    let mut pipeline = SqlPipeline::standard(&config.units, &config.aggregate_schema);
    for _ in 0..2 {
        WarehouseInitializer::new(&mut test_db.db, &mut pipeline, config.clone())
            .ingest_all(None, None)
            .expect("ingest all");
    }

    let db = &test_db.db;
    assert_eq!(count_rows(db, "hpcdb_jobs"), 4);
    assert_eq!(count_rows(db, "jobfact"), 4);
    assert_eq!(
        scalar(db, "SELECT SUM(job_count) FROM jobfact_by_month"),
        4
    );
}

#[test]
fn date_range_reingest_refreshes_existing_facts() {
    let mut test_db = setup_db();
    shred_slurm_fixture(&mut test_db.db);

    let config = InitializerConfig {
        units: vec![AggregationUnit::Day],
        ..InitializerConfig::default()
    };
    let mut pipeline = SqlPipeline::standard(&config.units, &config.aggregate_schema);
    WarehouseInitializer::new(&mut test_db.db, &mut pipeline, config.clone())
        .ingest_all(None, None)
        .expect("ingest all");

    test_db
        .db
        .execute_batch("UPDATE hpcdb_jobs SET processors = 1")
        .expect("update hpcdb");
    WarehouseInitializer::new(&mut test_db.db, &mut pipeline, config)
        .ingest_all(Some(date("2015-06-30")), Some(date("2015-06-30")))
        .expect("ingest range");

    let db = &test_db.db;
    assert_eq!(scalar(db, "SELECT SUM(processors) FROM jobfact"), 256 + 3);
    assert_eq!(scalar(db, "SELECT SUM(processors) FROM jobfact WHERE local_jobid = 4103951"), 3);
    assert_eq!(
        scalar(db, "SELECT SUM(cpu_time) FROM jobfact_by_day WHERE day_id = 201500181 AND queue_id = 'debug'"),
        3 * 5_400
    );
}

#[test]
fn job_without_submit_time_is_loaded_once() {
    let mut test_db = setup_db();
    let log = test_db.dir.path().join("sacct.log");
    std::fs::write(
        &log,
        "4104001|4104001|ub-hpc|debug|normal|anon|anon|918273|unknown|192837|Unknown|2015-06-30T10:05:00|2015-06-30T11:00:00|2015-06-30T12:30:00|01:30:00|0:0|COMPLETED|1|4|4|3000Mc|||02:00:00|k05n27|nosubmit\n",
    )
    .expect("write log");
    let catalog = ResourceCatalog::new(vec![ResourceConfig::new("frearson")]);
    {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
        shredder.set_resource("frearson", &catalog).expect("resource");
        shredder.shred_file(&log).expect("shred");
        shredder.job_ingestor(false).run(shredder.db()).expect("ingest");
    }

    let config = InitializerConfig {
        units: vec![AggregationUnit::Day],
        ..InitializerConfig::default()
    };
    let mut pipeline = SqlPipeline::standard(&config.units, &config.aggregate_schema);
    for _ in 0..3 {
        WarehouseInitializer::new(&mut test_db.db, &mut pipeline, config.clone())
            .ingest_all(None, None)
            .expect("ingest all");
    }

    let db = &test_db.db;
    assert_eq!(count_rows(db, "shredded_job"), 1);
    assert_eq!(count_rows(db, "staging_job"), 1);
    assert_eq!(count_rows(db, "hpcdb_jobs"), 1);
    assert_eq!(count_rows(db, "jobfact"), 1);
    assert_eq!(
        scalar(db, "SELECT submit_time_ts FROM jobfact"),
        support::ts("2015-06-30 10:05:00")
    );
    assert_eq!(scalar(db, "SELECT waitduration FROM jobfact"), 3_300);
    assert_eq!(scalar(db, "SELECT SUM(job_count) FROM jobfact_by_day"), 1);
}
