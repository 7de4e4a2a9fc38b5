use serde_json::Value;
use tracing::debug;
use warehouse_core::{FieldValue, ShreddedRecord};

use crate::format::ParseState;
use crate::parsed::{Parsed, ParsedJob};
use crate::slurm::{first_node, normalize_state, skip_unended};
use crate::types::{Result, ShredError};

/// Parses a single job object from `sacct --json` output.
pub(crate) fn parse_line(line: &str, state: &mut ParseState) -> Result<Parsed> {
    let job: Value = serde_json::from_str(line)
        .map_err(|err| ShredError::parse(format!("Malformed Slurm json job: {}", err)))?;
    parse_job(&job, state)
}

/// Integers are plain numbers in older releases and `{"number": n, ...}`
/// objects in newer ones.
fn number(value: &Value) -> Option<i64> {
    match value {
        Value::Object(map) => map.get("number").and_then(Value::as_i64),
        other => other.as_i64(),
    }
}

fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

fn number_at(value: &Value, keys: &[&str]) -> Option<i64> {
    path(value, keys).and_then(number)
}

fn text_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    path(value, keys).and_then(Value::as_str)
}

pub(crate) fn parse_job(job: &Value, state: &mut ParseState) -> Result<Parsed> {
    if !job.is_object() {
        return Err(ShredError::parse("Slurm json job is not an object"));
    }

    let end_time = number_at(job, &["time", "end"]).unwrap_or(0);
    if end_time == 0 {
        return Ok(Parsed::Skip("job with unknown end time".to_string()));
    }
    let nodes = text_at(job, &["nodes"]).unwrap_or_default();
    if nodes == "None assigned" {
        return Ok(Parsed::Skip("job with no nodes assigned".to_string()));
    }

    let job_state = normalize_state(&job_state(job));
    if let Some(skip) = skip_unended(&job_state, state) {
        return Ok(skip);
    }

    let raw_job_id = number_at(job, &["job_id"])
        .ok_or_else(|| ShredError::parse("Slurm json job has no job_id"))?;
    let (job_id, array_index) = job_id(job, raw_job_id);

    let mut record = ShreddedRecord::new();
    record.set("job_id", job_id);
    record.set("job_array_index", array_index);
    record.set("job_id_raw", raw_job_id.to_string());
    for (column, key) in [
        ("cluster_name", "cluster"),
        ("partition_name", "partition"),
        ("qos_name", "qos"),
        ("account_name", "account"),
        ("group_name", "group"),
        ("user_name", "user"),
        ("job_name", "name"),
    ] {
        record.set(column, text_at(job, &[key]));
    }
    record.set("gid_number", -1);
    record.set("uid_number", -1);
    record.set("submit_time", number_at(job, &["time", "submission"]));
    record.set("eligible_time", number_at(job, &["time", "eligible"]));
    record.set("start_time", start_time(job, end_time));
    record.set("end_time", end_time);
    record.set("elapsed", number_at(job, &["time", "elapsed"]));
    record.set("exit_code", exit_code(job, &job_state));
    record.set("state", job_state.as_str());
    record.set("nnodes", tres_value(job, "node", None));
    record.set("ncpus", tres_value(job, "cpu", None));
    record.set("ngpus", tres_value(job, "gres", Some("gpu")));
    record.set("req_cpus", number_at(job, &["required", "CPUs"]));
    record.set(
        "req_mem",
        tres_value(job, "mem", None).saturating_mul(1024 * 1024),
    );
    record.set("timelimit", time_limit(job));
    record.set("node_list", nodes);

    debug!(job_id, array_index, "Parsed Slurm json job");
    Ok(Parsed::Job(ParsedJob::single(
        record,
        Some(first_node(nodes)),
    )))
}

fn job_state(job: &Value) -> String {
    let current = path(job, &["state", "current"]);
    let state = match current {
        Some(Value::Array(states)) => states.first().and_then(Value::as_str),
        Some(other) => other.as_str(),
        None => None,
    };
    state.unwrap_or_default().to_string()
}

/// Array tasks carry the parent job id and their task id.
fn job_id(job: &Value, raw_job_id: i64) -> (i64, i64) {
    match number_at(job, &["array", "job_id"]) {
        Some(array_job_id) if array_job_id != 0 => {
            let task_id = number_at(job, &["array", "task_id"]).unwrap_or(-1);
            (array_job_id, task_id)
        }
        _ => (raw_job_id, -1),
    }
}

/// Earliest step start; jobs without steps use the job's own start, or its
/// end when nothing ran.
fn start_time(job: &Value, end_time: i64) -> Option<i64> {
    let step_start = job
        .get("steps")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|step| number_at(step, &["time", "start"]))
        .min();
    if step_start.is_some() {
        return step_start;
    }
    if number_at(job, &["time", "elapsed"]).unwrap_or(0) == 0 {
        Some(end_time)
    } else {
        number_at(job, &["time", "start"])
    }
}

/// `return_code:signal`, with failed jobs reported as `1:0`.
fn exit_code(job: &Value, job_state: &str) -> String {
    if job_state == "FAILED" {
        return "1:0".to_string();
    }
    let derived = job.get("derived_exit_code");
    let return_code = derived.and_then(|derived| number_at(derived, &["return_code"]));
    let signal = derived
        .and_then(|derived| derived.get("signal"))
        .and_then(|signal| {
            number_at(signal, &["id"]).or_else(|| number_at(signal, &["signal_id"]))
        })
        .unwrap_or(0);
    match return_code {
        Some(return_code) => format!("{}:{}", return_code, signal),
        None => format!("{}:0", signal),
    }
}

/// Allocated TRES count, falling back to the requested count, as sacct
/// reports it.
fn tres_value(job: &Value, tres_type: &str, tres_name: Option<&str>) -> i64 {
    ["allocated", "requested"]
        .iter()
        .filter_map(|kind| path(job, &["tres", kind]).and_then(Value::as_array))
        .find_map(|entries| {
            entries.iter().find_map(|entry| {
                let type_matches = text_at(entry, &["type"]) == Some(tres_type);
                let name_matches =
                    tres_name.is_none_or(|name| text_at(entry, &["name"]) == Some(name));
                if type_matches && name_matches {
                    number_at(entry, &["count"])
                } else {
                    None
                }
            })
        })
        .unwrap_or(0)
}

/// The limit is reported in minutes; staged in seconds like sacct's text
/// output.
fn time_limit(job: &Value) -> FieldValue {
    let limit = path(job, &["time", "limit"]);
    let infinite = limit
        .and_then(|limit| limit.get("infinite"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if infinite {
        return FieldValue::Null;
    }
    let minutes = limit.and_then(number).unwrap_or(0);
    FieldValue::from(minutes.checked_mul(60))
}
