mod support;

use ingest::{Format, ShredError, Shredder};
use support::{SLURM_LINE, catalog, count_rows, fixture, rows, setup_db};
use warehouse_core::ConfigError;

#[test]
fn format_names_resolve_case_insensitively() {
    assert_eq!(Format::from_name("Slurm").expect("slurm"), Format::Slurm);
    assert_eq!(Format::from_name("torque").expect("torque"), Format::Pbs);
    assert_eq!(Format::from_name("LSF").expect("lsf"), Format::Lsf);
    assert_eq!(Format::from_name("pbspro").expect("pbspro"), Format::Pbs);
    assert_eq!(Format::from_name("SGE").expect("sge"), Format::Sge);
    assert_eq!(Format::from_name("slurm-json").expect("slurm json"), Format::SlurmJson);
    assert_eq!(Format::SlurmJson.source_format(), "slurm");
    assert_eq!(Format::SlurmJson.table_name(), Format::Slurm.table_name());
    assert!(matches!(
        Format::from_name("condor"),
        Err(ShredError::UnknownFormat(name)) if name == "condor"
    ));
}

#[test]
fn slurm_line_is_staged_with_epoch_times() {
    let mut test_db = setup_db();
    {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
        shredder.set_resource("frearson", &catalog()).expect("resource");
        shredder.shred_line(SLURM_LINE).expect("shred");
        assert!(!shredder.has_job_errors());
    }

    let staged = rows(&test_db.db, "SELECT * FROM shredded_job_slurm");
    assert_eq!(staged.len(), 1);
    let row = &staged[0];
    assert_eq!(row.get_i64("job_id"), Some(4_103_947));
    assert_eq!(row.get_i64("job_array_index"), Some(-1));
    assert_eq!(row.get_text("cluster_name").as_deref(), Some("frearson"));
    assert_eq!(row.get_i64("submit_time"), Some(1_435_327_020));
    assert_eq!(row.get_i64("eligible_time"), Some(1_435_327_020));
    assert_eq!(row.get_i64("start_time"), Some(1_435_460_150));
    assert_eq!(row.get_i64("end_time"), Some(1_435_719_350));
    assert_eq!(row.get_i64("elapsed"), Some(259_200));
    assert_eq!(row.get_i64("timelimit"), Some(259_200));
    assert_eq!(row.get_i64("nnodes"), Some(32));
    assert_eq!(row.get_i64("ncpus"), Some(256));
    assert_eq!(row.get_i64("ngpus"), Some(0));
    assert_eq!(row.get_text("job_name").as_deref(), Some("1AbC-2-3"));
}

#[test]
fn slurm_fixture_skips_steps_and_expands_arrays() {
    let mut test_db = setup_db();
    let count = {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
        shredder
            .shred_file(&fixture("slurm_sacct.log"))
            .expect("shred file")
    };
    assert_eq!(count, 4);
    assert_eq!(count_rows(&test_db.db, "shredded_job_slurm"), 4);

    let array_rows = rows(
        &test_db.db,
        "SELECT job_array_index, ngpus FROM shredded_job_slurm WHERE job_id = 4103951 ORDER BY job_array_index",
    );
    let indexes: Vec<i64> = array_rows
        .iter()
        .filter_map(|row| row.get_i64("job_array_index"))
        .collect();
    assert_eq!(indexes, vec![1, 3, 4]);
    assert!(array_rows.iter().all(|row| row.get_i64("ngpus") == Some(2)));
}

#[test]
fn malformed_slurm_line_is_a_parse_error() {
    let mut test_db = setup_db();
    let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
    let err = shredder.shred_line("1|2|3").expect_err("malformed");
    assert!(matches!(err, ShredError::Parse(ref message) if message.starts_with("Malformed Slurm sacct line")));
}

#[test]
fn torque_and_pbs_pro_lines_are_staged() {
    let mut test_db = setup_db();
    {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Pbs).expect("shredder");
        shredder.set_resource("edge", &catalog()).expect("resource");
        shredder
            .shred_file(&fixture("pbs_accounting.log"))
            .expect("shred file");
    }

    let staged = rows(&test_db.db, "SELECT * FROM shredded_job_pbs ORDER BY job_id");
    assert_eq!(staged.len(), 4);

    let torque = &staged[0];
    assert_eq!(torque.get_i64("job_id"), Some(6));
    assert_eq!(torque.get_text("host").as_deref(), Some("edge"));
    assert_eq!(torque.get_text("groupname").as_deref(), Some("ccrstaff"));
    assert_eq!(torque.get_i64("resources_used_walltime"), Some(2_197));
    assert_eq!(torque.get_i64("resources_used_mem"), Some(15_605_760));
    assert_eq!(torque.get_i64("resources_used_vmem"), Some(359_358_464));
    assert_eq!(torque.get_i64("resources_used_nodes"), Some(4));
    assert_eq!(torque.get_i64("resources_used_cpus"), Some(32));
    assert_eq!(torque.get_i64("resource_list_pcput"), Some(518_400));
    assert_eq!(torque.get_i64("resource_list_walltime"), Some(14_400));
    assert_eq!(
        torque.get_text("node_list").as_deref(),
        Some("i02n33,i02n32,i02n31,i02n30")
    );

    let pro = &staged[1];
    assert_eq!(pro.get_i64("job_id"), Some(2_994));
    assert_eq!(pro.get_i64("resources_used_nodes"), Some(5));
    assert_eq!(pro.get_i64("resources_used_cpus"), Some(65));
    assert_eq!(pro.get_i64("resources_used_mem"), Some(679_936));
    assert_eq!(pro.get_text("node_list").as_deref(), Some("c1,c2,c3,c4,c5"));

    let ranged = &staged[2];
    assert_eq!(ranged.get_i64("resources_used_nodes"), Some(2));
    assert_eq!(ranged.get_i64("resources_used_cpus"), Some(12));

    let torque5 = &staged[3];
    assert_eq!(torque5.get_i64("job_id"), Some(6_464_684));
    assert_eq!(torque5.get_i64("resource_list_mem"), Some(2_089_811_968));
    assert_eq!(torque5.get_i64("resources_used_mem"), Some(171_892_736));
    assert_eq!(torque5.get_text("account").as_deref(), Some("anonaccount"));
}

#[test]
fn lsf_job_finish_record_is_staged() {
    let mut test_db = setup_db();
    {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Lsf).expect("shredder");
        shredder.set_resource("lsfcluster", &catalog()).expect("resource");
        shredder.shred_file(&fixture("lsb.acct")).expect("shred file");
    }

    let staged = rows(&test_db.db, "SELECT * FROM shredded_job_lsf");
    assert_eq!(staged.len(), 1);
    let row = &staged[0];
    assert_eq!(row.get_i64("job_id"), Some(404_717));
    assert_eq!(row.get_i64("idx"), Some(0));
    assert_eq!(row.get_text("resource_name").as_deref(), Some("lsfcluster"));
    assert_eq!(row.get_text("queue").as_deref(), Some("regular"));
    assert_eq!(row.get_text("user_name").as_deref(), Some("anonuser"));
    assert_eq!(row.get_text("project_name").as_deref(), Some("anonproject"));
    assert_eq!(row.get_i64("submit_time"), Some(1_389_642_318));
    assert_eq!(row.get_i64("start_time"), Some(1_389_642_771));
    assert_eq!(row.get_i64("event_time"), Some(1_389_683_139));
    assert_eq!(row.get_i64("num_processors"), Some(128));
    assert_eq!(row.get_i64("num_ex_hosts"), Some(8));
    assert_eq!(row.get_i64("exit_status"), Some(0));
    assert_eq!(
        row.get_text("node_list").as_deref(),
        Some(
            "host1201-ib,host1234-ib,host1235-ib,host1236-ib,host1257-ib,host1270-ib,host1301-ib,host1303-ib"
        )
    );
}

#[test]
fn lsf_job_without_exec_hosts_passes_host_filter() {
    let fixture_line = std::fs::read_to_string(fixture("lsb.acct")).expect("read fixture");
    let exec_hosts = r#" 0 8 "16*host1201-ib" "16*host1234-ib" "16*host1235-ib" "16*host1236-ib" "16*host1257-ib" "16*host1270-ib" "16*host1301-ib" "16*host1303-ib" 64 "#;
    assert!(fixture_line.contains(exec_hosts));
    let hostless = fixture_line.trim_end().replace(exec_hosts, " 0 0 64 ");

    let mut test_db = setup_db();
    {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Lsf).expect("shredder");
        shredder.set_resource("lsfcluster", &catalog()).expect("resource");
        shredder.set_host_filter("^host13").expect("filter");
        shredder.shred_line(fixture_line.trim_end()).expect("shred");
        shredder.shred_line(&hostless).expect("shred hostless");
    }

    let staged = rows(&test_db.db, "SELECT num_ex_hosts, node_list FROM shredded_job_lsf");
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].get_i64("num_ex_hosts"), Some(0));
    assert_eq!(staged[0].get_text("node_list").as_deref(), Some(""));
}

#[test]
fn sge_lines_are_staged_per_host() {
    let mut test_db = setup_db();
    let count = {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Sge).expect("shredder");
        shredder.set_resource("sgecluster", &catalog()).expect("resource");
        let count = shredder
            .shred_file(&fixture("sge_accounting.log"))
            .expect("shred file");
        assert_eq!(shredder.job_errors().len(), 1);
        assert_eq!(shredder.job_errors()[0].job_id.as_deref(), Some("104"));
        count
    };
    assert_eq!(count, 7);

    let staged = rows(
        &test_db.db,
        "SELECT * FROM shredded_job_sge ORDER BY job_number, task_number, hostname",
    );
    assert_eq!(staged.len(), 6);

    let serial = &staged[0];
    assert_eq!(serial.get_text("clustername").as_deref(), Some("sgecluster"));
    assert_eq!(serial.get_text("hostname").as_deref(), Some("node01"));
    assert_eq!(serial.get_i64("job_number"), Some(101));
    assert_eq!(serial.get_i64("submission_time"), Some(1_435_656_000));
    assert_eq!(serial.get_i64("ru_wallclock"), Some(3_600));
    assert_eq!(serial.get_text("pe_taskid"), None);
    assert_eq!(serial.get_text("resource_list_h_rt").as_deref(), Some("7200"));
    assert_eq!(serial.get_i64("resource_list_h_vmem"), Some(2_097_152));

    let master = &staged[1];
    assert_eq!(master.get_text("hostname").as_deref(), Some("node02"));
    assert_eq!(master.get_i64("slots"), Some(16));
    assert_eq!(master.get_text("resource_list_slots").as_deref(), Some("16"));
    assert_eq!(master.get_i64("resource_list_mem_free"), Some(4_194_304));
    assert_eq!(staged[2].get_text("pe_taskid").as_deref(), Some("1.node03"));

    let tasks: Vec<Option<i64>> = staged[3..5]
        .iter()
        .map(|row| row.get_i64("task_number"))
        .collect();
    assert_eq!(tasks, vec![Some(1), Some(2)]);
    assert_eq!(staged[5].get_i64("start_time"), Some(0));
}

#[test]
fn slurm_json_document_is_staged_like_sacct_lines() {
    let mut test_db = setup_db();
    let count = {
        let mut shredder = Shredder::new(&mut test_db.db, Format::SlurmJson).expect("shredder");
        shredder.set_resource("frearson", &catalog()).expect("resource");
        shredder
            .shred_file(&fixture("slurm_sacct.json"))
            .expect("shred file")
    };
    assert_eq!(count, 4);

    let staged = rows(&test_db.db, "SELECT * FROM shredded_job_slurm ORDER BY job_id");
    assert_eq!(staged.len(), 2);

    let job = &staged[0];
    assert_eq!(job.get_i64("job_id"), Some(5_000));
    assert_eq!(job.get_i64("job_array_index"), Some(-1));
    assert_eq!(job.get_text("job_id_raw").as_deref(), Some("5000"));
    assert_eq!(job.get_text("cluster_name").as_deref(), Some("frearson"));
    assert_eq!(job.get_text("partition_name").as_deref(), Some("general-compute"));
    assert_eq!(job.get_text("user_name").as_deref(), Some("alice"));
    assert_eq!(job.get_i64("uid_number"), Some(-1));
    assert_eq!(job.get_i64("submit_time"), Some(1_435_656_000));
    assert_eq!(job.get_i64("start_time"), Some(1_435_658_002));
    assert_eq!(job.get_i64("end_time"), Some(1_435_661_600));
    assert_eq!(job.get_i64("elapsed"), Some(3_600));
    assert_eq!(job.get_i64("timelimit"), Some(7_200));
    assert_eq!(job.get_text("exit_code").as_deref(), Some("0:0"));
    assert_eq!(job.get_text("state").as_deref(), Some("COMPLETED"));
    assert_eq!(job.get_i64("nnodes"), Some(2));
    assert_eq!(job.get_i64("ncpus"), Some(16));
    assert_eq!(job.get_i64("ngpus"), Some(2));
    assert_eq!(job.get_i64("req_cpus"), Some(16));
    assert_eq!(job.get_i64("req_mem"), Some(8_000 * 1_024 * 1_024));
    assert_eq!(job.get_text("node_list").as_deref(), Some("cpn-[01-02]"));

    let task = &staged[1];
    assert_eq!(task.get_i64("job_id"), Some(5_001));
    assert_eq!(task.get_i64("job_array_index"), Some(3));
    assert_eq!(task.get_text("job_id_raw").as_deref(), Some("5002"));
    assert_eq!(task.get_i64("start_time"), Some(1_435_662_000));
    assert_eq!(task.get_text("exit_code").as_deref(), Some("1:0"));
    assert_eq!(task.get_text("state").as_deref(), Some("FAILED"));
    assert_eq!(task.get_i64("timelimit"), None);
    assert_eq!(task.get_i64("ncpus"), Some(4));
}

#[test]
fn slurm_json_without_jobs_array_is_rejected() {
    let mut test_db = setup_db();
    let path = test_db.dir.path().join("empty.json");
    std::fs::write(&path, r#"{"meta": {}, "errors": []}"#).expect("write file");
    let mut shredder = Shredder::new(&mut test_db.db, Format::SlurmJson).expect("shredder");
    let err = shredder.shred_file(&path).expect_err("no jobs array");
    assert!(matches!(err, ShredError::Parse(ref message) if message.starts_with("No \"jobs\" array")));
    assert_eq!(shredder.stats().files, 0);
}

#[test]
fn host_filter_tests_first_node() {
    let mut test_db = setup_db();
    let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
    shredder.set_resource("filtered", &catalog()).expect("resource");
    assert!(shredder.has_host_filter());
    assert!(!shredder.test_host_filter(Some("d07n07s01")));
    assert!(shredder.test_host_filter(Some("d07n08s01")));
    assert!(!shredder.test_host_filter(None));

    shredder.shred_line(SLURM_LINE).expect("shred");
    drop(shredder);
    assert_eq!(count_rows(&test_db.db, "shredded_job_slurm"), 0);
}

#[test]
fn invalid_host_filter_is_a_config_error() {
    let mut test_db = setup_db();
    let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
    let err = shredder.set_host_filter("node[").expect_err("bad regex");
    assert!(matches!(
        err,
        ShredError::Config(ConfigError::InvalidHostFilter { .. })
    ));
}

#[test]
fn unknown_resource_is_reported() {
    let mut test_db = setup_db();
    let mut shredder = Shredder::new(&mut test_db.db, Format::Pbs).expect("shredder");
    let err = shredder
        .set_resource("missing", &catalog())
        .expect_err("unknown resource");
    assert_eq!(err.to_string(), "No config found for 'missing'");
}

#[test]
fn pi_column_override_changes_column_map() {
    let mut test_db = setup_db();
    let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
    assert_eq!(shredder.column_map().get("pi_name"), Some("group_name"));
    shredder.set_resource("rush", &catalog()).expect("resource");
    assert_eq!(shredder.column_map().get("pi_name"), Some("\"account_name\""));

    let err = Format::Pbs
        .column_map(Some("no_such_column"))
        .expect_err("invalid pi column");
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn start_after_end_is_reported_and_repaired() {
    let line = SLURM_LINE.replace("2015-06-28T02:55:50", "2015-07-02T00:00:00");
    let mut test_db = setup_db();
    {
        let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
        shredder.shred_line(&line).expect("shred");
        assert_eq!(shredder.job_errors().len(), 1);
        let error = &shredder.job_errors()[0];
        assert_eq!(error.job_id.as_deref(), Some("4103947"));
        assert_eq!(error.input, line);
        assert_eq!(error.messages, vec!["Job start time as after job end time."]);
    }
    let staged = rows(&test_db.db, "SELECT start_time, end_time FROM shredded_job_slurm");
    assert_eq!(staged[0].get_i64("start_time"), Some(1_435_719_350 - 259_200));
    assert_eq!(staged[0].get_i64("end_time"), Some(1_435_719_350));
}

#[test]
fn node_count_above_cpu_count_is_reported() {
    let line = SLURM_LINE.replace("|TIMEOUT|32|256|", "|TIMEOUT|32|16|");
    let mut test_db = setup_db();
    let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
    shredder.shred_line(&line).expect("shred");
    assert_eq!(
        shredder.job_errors()[0].messages,
        vec!["Job node count greater than cpu count (32 > 16)."]
    );
}

#[test]
fn job_error_report_lists_inputs_and_messages() {
    let line = SLURM_LINE.replace("|TIMEOUT|32|256|", "|TIMEOUT|32|16|");
    let mut test_db = setup_db();
    let report_path = test_db.dir.path().join("errors.txt");
    let mut shredder = Shredder::new(&mut test_db.db, Format::Slurm).expect("shredder");
    shredder.set_resource("frearson", &catalog()).expect("resource");
    shredder.shred_line(&line).expect("shred");
    shredder.write_job_errors(&report_path).expect("write report");

    let report = std::fs::read_to_string(&report_path).expect("read report");
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "=".repeat(72));
    assert!(lines[1].starts_with("Shredder end time: "));
    assert_eq!(lines[2], "Resource: frearson");
    assert_eq!(lines[3], "Format: slurm");
    assert!(lines[4].starts_with("Input format: jobid|jobidraw|cluster|"));
    assert_eq!(lines[5], "");
    assert_eq!(lines[6], "-".repeat(72));
    assert_eq!(lines[7], "Input:");
    assert_eq!(lines[8], line);
    assert_eq!(lines[9], "");
    assert_eq!(lines[10], "Job node count greater than cpu count (32 > 16).");
}
