use tracing::{debug, error};
use warehouse_core::ShreddedRecord;

use crate::parsed::{Parsed, ParsedJob};
use crate::types::Result;

pub(crate) const COLUMNS: &[&str] = &[
    "job_id",
    "idx",
    "job_name",
    "resource_name",
    "queue",
    "user_name",
    "project_name",
    "submit_time",
    "start_time",
    "event_time",
    "num_processors",
    "num_ex_hosts",
    "exit_status",
    "exit_info",
    "node_list",
];

// Exit code and exit state are integers in lsb.acct; other formats use text.
pub(crate) const COLUMN_MAP: &[(&str, &str)] = &[
    ("date_key", "date(event_time, 'unixepoch')"),
    ("job_id", "job_id"),
    ("job_id_raw", "CAST(job_id AS TEXT)"),
    ("job_array_index", "idx"),
    ("job_name", "job_name"),
    ("resource_name", "resource_name"),
    ("queue_name", "queue"),
    ("user_name", "user_name"),
    ("project_name", "project_name"),
    ("pi_name", "project_name"),
    ("start_time", "start_time"),
    ("end_time", "event_time"),
    ("submission_time", "submit_time"),
    ("wall_time", "MAX(event_time - start_time, 0)"),
    ("wait_time", "MAX(start_time - submit_time, 0)"),
    ("node_count", "num_ex_hosts"),
    ("cpu_count", "num_processors"),
    ("node_list", "node_list"),
    ("exit_code", "CAST(exit_status AS TEXT)"),
    ("exit_state", "CAST(exit_info AS TEXT)"),
];

/// Fields of a `JOB_FINISH` record in lsb.acct.
const FIELD_NAMES: &[&str] = &[
    "event_type",
    "version_number",
    "event_time",
    "job_id",
    "user_id",
    "options",
    "num_processors",
    "submit_time",
    "begin_time",
    "term_time",
    "start_time",
    "user_name",
    "queue",
    "res_req",
    "depend_cond",
    "pre_exec_cmd",
    "from_host",
    "cwd",
    "in_file",
    "out_file",
    "err_file",
    "job_file",
    // Followed by `num_asked_hosts` host names.
    "num_asked_hosts",
    "asked_hosts",
    // Followed by `num_ex_hosts` host names.
    "num_ex_hosts",
    "exec_hosts",
    "j_status",
    "host_factor",
    "job_name",
    "command",
    "ru_utime",
    "ru_stime",
    "ru_maxrss",
    "ru_ixrss",
    "ru_ismrss",
    "ru_idrss",
    "ru_isrss",
    "ru_minflt",
    "ru_majflt",
    "ru_nswap",
    "ru_inblock",
    "ru_oublock",
    "ru_ioch",
    "ru_msgsnd",
    "ru_msgrcv",
    "ru_nsignals",
    "ru_nvcsw",
    "ru_nivcsw",
    "ru_exutime",
    "mail_user",
    "project_name",
    "exit_status",
    "max_num_processors",
    "login_shell",
    "time_event",
    "idx",
    "max_rmem",
    "max_rswap",
    "in_file_spool",
    "command_spool",
    "rsv_id",
    "sla",
    "except_mask",
    "additional_info",
    "exit_info",
    "warning_action",
    "warning_time_period",
    "charged_saap",
    "license_project",
    "app",
    "post_exec_cmd",
    "runtime_estimation",
    "job_group_name",
    "requeue_evalues",
    "options2",
    "resize_notify_cmd",
    "last_resize_time",
    "rsv_id_2",
    "job_description",
    "submit_ext_num",
    "options3",
    "bsub_w",
    "num_host_rusage",
    "effective_res_req",
    "total_provisional_time",
    "run_time",
];

pub(crate) fn parse_line(line: &str) -> Result<Parsed> {
    let Some((first_field, _)) = line.split_once(' ') else {
        error!(line, "Unexpected lsb.acct format");
        return Ok(Parsed::Skip("unexpected lsb.acct format".to_string()));
    };
    if first_field.trim_matches(|c| c == '\'' || c == '"') != "JOB_FINISH" {
        return Ok(Parsed::Skip("non-JOB_FINISH line".to_string()));
    }

    let tokens = tokenize(line);
    let fields = map_fields(&tokens);

    let mut record = ShreddedRecord::new();
    let mut exec_hosts: Vec<String> = Vec::new();
    let (mut utime, mut stime) = (0.0_f64, 0.0_f64);
    for (name, value) in fields {
        match (name, value) {
            ("exec_hosts", FieldData::List(hosts)) => {
                for host in hosts {
                    let host = strip_slots(host);
                    if !exec_hosts.iter().any(|known| known == host) {
                        exec_hosts.push(host.to_string());
                    }
                }
            }
            (_, FieldData::List(_)) => {}
            ("ru_utime", FieldData::Value(value)) => utime = value.parse().unwrap_or(0.0),
            ("ru_stime", FieldData::Value(value)) => stime = value.parse().unwrap_or(0.0),
            (name, FieldData::Value(value)) => record.set(name, value),
        }
    }

    // Only used to repair inconsistent start and end times.
    let walltime = (utime.max(0.0) + stime.max(0.0)).floor() as i64;
    debug!(ru_utime = utime, ru_stime = stime, walltime, "Estimating walltime with data from rusage");
    record.set("walltime", walltime);

    record.set("num_ex_hosts", exec_hosts.len() as i64);
    record.set("node_list", exec_hosts.join(","));

    let first_host = exec_hosts.into_iter().next();
    Ok(Parsed::Job(ParsedJob::single(record, first_host)))
}

enum FieldData<'a> {
    Value(&'a str),
    List(&'a [String]),
}

fn map_fields(tokens: &[String]) -> Vec<(&'static str, FieldData<'_>)> {
    let mut fields = Vec::new();
    let mut idx = 0;
    let mut names = FIELD_NAMES.iter();
    while idx < tokens.len() {
        let Some(name) = names.next() else {
            debug!(extra = ?&tokens[idx..], "Extra fields");
            break;
        };
        let value = tokens[idx].as_str();
        fields.push((*name, FieldData::Value(value)));
        idx += 1;

        if *name == "num_asked_hosts" || *name == "num_ex_hosts" {
            let count = value.parse::<usize>().unwrap_or(0);
            let end = (idx + count).min(tokens.len());
            if let Some(list_name) = names.next() {
                fields.push((*list_name, FieldData::List(&tokens[idx..end])));
            }
            idx = end;
        }
    }
    fields
}

/// `16*host` (slots on host) to `host`.
fn strip_slots(host: &str) -> &str {
    match host.split_once('*') {
        Some((slots, name)) if !slots.is_empty() && slots.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Splits a line on single spaces, honouring `"` quoting with `""` escapes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == ' ' {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    tokens.push(current);
    tokens
}
