use chrono::NaiveDateTime;
use tracing::{debug, warn};
use warehouse_core::{FieldValue, ShreddedRecord};

use crate::format::ParseState;
use crate::parsed::{Parsed, ParsedJob};
use crate::types::{Result, ShredError};

/// sacct field names, in the order `--format` must request them.
pub(crate) const FIELD_NAMES: &[&str] = &[
    "jobid",
    "jobidraw",
    "cluster",
    "partition",
    "qos",
    "account",
    "group",
    "gid",
    "user",
    "uid",
    "submit",
    "eligible",
    "start",
    "end",
    "elapsed",
    "exitcode",
    "state",
    "nnodes",
    "ncpus",
    "reqcpus",
    "reqmem",
    "reqtres",
    "alloctres",
    "timelimit",
    "nodelist",
    "jobname",
];

/// Staging column for each sacct field, same order as `FIELD_NAMES`.
const LINE_COLUMNS: &[&str] = &[
    "job_id",
    "job_id_raw",
    "cluster_name",
    "partition_name",
    "qos_name",
    "account_name",
    "group_name",
    "gid_number",
    "user_name",
    "uid_number",
    "submit_time",
    "eligible_time",
    "start_time",
    "end_time",
    "elapsed",
    "exit_code",
    "state",
    "nnodes",
    "ncpus",
    "req_cpus",
    "req_mem",
    "req_tres",
    "alloc_tres",
    "timelimit",
    "node_list",
    "job_name",
];

pub(crate) const COLUMNS: &[&str] = &[
    "job_id",
    "job_array_index",
    "job_id_raw",
    "cluster_name",
    "partition_name",
    "qos_name",
    "account_name",
    "group_name",
    "gid_number",
    "user_name",
    "uid_number",
    "submit_time",
    "eligible_time",
    "start_time",
    "end_time",
    "elapsed",
    "exit_code",
    "state",
    "nnodes",
    "ncpus",
    "req_cpus",
    "req_mem",
    "req_tres",
    "alloc_tres",
    "timelimit",
    "node_list",
    "job_name",
    "ngpus",
];

pub(crate) const COLUMN_MAP: &[(&str, &str)] = &[
    ("date_key", "date(end_time, 'unixepoch')"),
    ("job_id", "job_id"),
    ("job_array_index", "NULLIF(job_array_index, -1)"),
    ("job_id_raw", "job_id_raw"),
    ("job_name", "job_name"),
    ("resource_name", "cluster_name"),
    ("queue_name", "partition_name"),
    ("qos_name", "qos_name"),
    ("user_name", "user_name"),
    ("uid_number", "uid_number"),
    ("group_name", "group_name"),
    ("gid_number", "gid_number"),
    ("account_name", "account_name"),
    ("pi_name", "group_name"),
    ("start_time", "start_time"),
    ("end_time", "end_time"),
    ("submission_time", "submit_time"),
    ("eligible_time", "eligible_time"),
    ("exit_code", "exit_code"),
    ("exit_state", "state"),
    ("wall_time", "MAX(end_time - start_time, 0)"),
    ("wait_time", "MAX(start_time - submit_time, 0)"),
    ("node_count", "nnodes"),
    ("cpu_count", "ncpus"),
    ("gpu_count", "ngpus"),
    ("cpu_req", "req_cpus"),
    ("mem_req", "req_mem"),
    ("timelimit", "timelimit"),
    ("node_list", "node_list"),
];

const ENDED_STATES: &[&str] = &[
    "BOOT_FAIL",
    "CANCELLED",
    "COMPLETED",
    "DEADLINE",
    "FAILED",
    "NODE_FAIL",
    "OUT_OF_MEMORY",
    "PREEMPTED",
    "REVOKED",
    "TIMEOUT",
];

const NON_ENDED_STATES: &[&str] = &["PENDING", "RUNNING", "REQUEUED", "RESIZING", "SUSPENDED"];

pub(crate) fn parse_line(line: &str, state: &mut ParseState) -> Result<Parsed> {
    let fields: Vec<&str> = line.splitn(LINE_COLUMNS.len(), '|').collect();
    if fields.len() != LINE_COLUMNS.len() {
        return Err(ShredError::parse(format!(
            "Malformed Slurm sacct line: '{}'",
            line
        )));
    }
    let field = |name: &str| -> &str {
        LINE_COLUMNS
            .iter()
            .position(|column| *column == name)
            .map(|idx| fields[idx])
            .unwrap_or_default()
    };

    if field("job_id").contains('.') {
        return Ok(Parsed::Skip("job step".to_string()));
    }
    if field("end_time") == "Unknown" {
        return Ok(Parsed::Skip("job with unknown end time".to_string()));
    }
    if field("node_list") == "None assigned" {
        return Ok(Parsed::Skip("job with no nodes assigned".to_string()));
    }

    let job_state = normalize_state(field("state"));
    if let Some(skip) = skip_unended(&job_state, state) {
        return Ok(skip);
    }

    let mut record = ShreddedRecord::new();
    for (column, value) in LINE_COLUMNS.iter().zip(fields.iter()) {
        record.set(*column, *value);
    }

    for column in ["submit_time", "eligible_time", "start_time", "end_time"] {
        record.set(column, parse_datetime(field(column)));
    }
    for column in ["elapsed", "timelimit"] {
        record.set(column, parse_time_field(field(column)));
    }
    record.set("ngpus", gpu_count_from_tres(field("alloc_tres")));

    let (job_id, array_indexes) = split_job_id(field("job_id"))?;
    record.set("job_id", job_id);
    if array_indexes.is_empty() {
        record.set("job_array_index", -1);
    }

    Ok(Parsed::Job(ParsedJob {
        record,
        first_host: Some(first_node(field("node_list"))),
        array_indexes,
    }))
}

/// Cancelled jobs are reported as "CANCELLED by <uid>".
pub(crate) fn normalize_state(state: &str) -> String {
    state
        .to_ascii_uppercase()
        .split(' ')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// A skip for jobs that have not ended. Unknown states are warned about
/// once per shredder.
pub(crate) fn skip_unended(job_state: &str, state: &mut ParseState) -> Option<Parsed> {
    if ENDED_STATES.contains(&job_state) {
        return None;
    }
    if !NON_ENDED_STATES.contains(&job_state) && state.unknown_states.insert(job_state.to_string())
    {
        warn!(
            state = %job_state,
            "Found job with unknown state, all jobs with this state will be ignored"
        );
    }
    Some(Parsed::Skip(format!("job with state \"{}\"", job_state)))
}

/// `YYYY-MM-DD?HH:MM:SS` in UTC to a unix timestamp.
fn parse_datetime(value: &str) -> FieldValue {
    let normalized = match (value.get(..10), value.get(11..)) {
        (Some(date), Some(time)) if value.len() == 19 => format!("{}T{}", date, time),
        _ => {
            debug!(value, "Failed to parse datetime");
            return FieldValue::Null;
        }
    };
    match NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S") {
        Ok(dt) => FieldValue::Int(dt.and_utc().timestamp()),
        Err(_) => {
            debug!(value, "Failed to parse datetime");
            FieldValue::Null
        }
    }
}

/// `[[days-]hours:]minutes:seconds[.fraction]` to seconds.
pub(crate) fn parse_time_field(value: &str) -> Option<i64> {
    if value.is_empty() || value.eq_ignore_ascii_case("UNLIMITED") {
        return None;
    }
    let value = match value.split_once('.') {
        Some((whole, fraction)) if is_digits(fraction) => whole,
        Some(_) => return None,
        None => value,
    };
    let (days, clock) = match value.split_once('-') {
        Some((days, clock)) => (Some(days), clock),
        None => (None, value),
    };
    let parts: Vec<&str> = clock.split(':').collect();
    if !parts.iter().all(|part| is_digits(part)) {
        return None;
    }
    let (hours, minutes, seconds) = match (parts.as_slice(), days) {
        ([minutes, seconds], None) => ("0", *minutes, *seconds),
        ([hours, minutes, seconds], _) => (*hours, *minutes, *seconds),
        _ => return None,
    };
    let days = match days {
        Some(days) if is_digits(days) => days.parse::<i64>().ok()?,
        Some(_) => return None,
        None => 0,
    };
    days.checked_mul(86_400)?
        .checked_add(hours.parse::<i64>().ok()?.checked_mul(3_600)?)?
        .checked_add(minutes.parse::<i64>().ok()?.checked_mul(60)?)?
        .checked_add(seconds.parse::<i64>().ok()?)
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// GPUs from an allocated TRES string such as `cpu=4,gres/gpu=2`.
fn gpu_count_from_tres(tres: &str) -> i64 {
    let mut untyped = None;
    let mut typed = 0;
    for entry in tres.split(',') {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        let Ok(count) = value.trim().parse::<i64>() else {
            continue;
        };
        if key == "gres/gpu" {
            untyped = Some(count);
        } else if key.starts_with("gres/gpu:") {
            typed += count;
        }
    }
    untyped.unwrap_or(typed)
}

/// First host of a Slurm nodeset (`node[1-4],other5` gives `node1`).
pub(crate) fn first_node(node_list: &str) -> String {
    let bracket = node_list.find('[');
    let comma = node_list.find(',');
    match (bracket, comma) {
        (Some(bracket), comma) if comma.is_none_or(|comma| bracket < comma) => {
            let prefix = &node_list[..bracket];
            let range = &node_list[bracket + 1..];
            let number: String = range.chars().take_while(char::is_ascii_digit).collect();
            format!("{}{}", prefix, number)
        }
        _ => node_list.split(',').next().unwrap_or_default().to_string(),
    }
}

/// Splits `123_4` / `123_[1,3-5]` into the base id and its array indexes.
fn split_job_id(job_id: &str) -> Result<(i64, Vec<i64>)> {
    let Some((base, array_part)) = job_id.split_once('_') else {
        return Ok((parse_job_number(job_id)?, Vec::new()));
    };
    if base.is_empty() || array_part.is_empty() {
        return Err(ShredError::parse(format!(
            "Unexpected underscore in job id '{}'",
            job_id
        )));
    }
    let indexes = parse_array_indexes(array_part).ok_or_else(|| {
        debug!(array_part, "Failed to parse job array indexes");
        ShredError::parse(format!("Failed to parse job id '{}'", job_id))
    })?;
    Ok((parse_job_number(base)?, indexes))
}

fn parse_job_number(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| ShredError::parse(format!("Failed to parse job id '{}'", value)))
}

/// Upper bound on the tasks one array record may expand to, matching
/// Slurm's largest `MaxArraySize`.
const MAX_ARRAY_TASKS: usize = 4_000_001;

fn parse_array_indexes(list: &str) -> Option<Vec<i64>> {
    if is_digits(list) {
        return Some(vec![list.parse().ok()?]);
    }
    let inner = list.strip_prefix('[')?.strip_suffix(']')?;
    let mut indexes = Vec::new();
    for part in inner.split(',') {
        match part.split_once('-') {
            Some((min, max)) => {
                let (min, max) = (min.parse::<i64>().ok()?, max.parse::<i64>().ok()?);
                if min > max {
                    return None;
                }
                let span = usize::try_from(max.checked_sub(min)?).ok()?.checked_add(1)?;
                if indexes.len().checked_add(span)? > MAX_ARRAY_TASKS {
                    return None;
                }
                indexes.extend(min..=max);
            }
            None => indexes.push(part.parse().ok()?),
        }
        if indexes.len() > MAX_ARRAY_TASKS {
            return None;
        }
    }
    Some(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_fields_cover_all_sacct_shapes() {
        assert_eq!(parse_time_field("3-00:00:00"), Some(259_200));
        assert_eq!(parse_time_field("14:00:49"), Some(50_449));
        assert_eq!(parse_time_field("05:07"), Some(307));
        assert_eq!(parse_time_field("00:01:02.345"), Some(62));
        assert_eq!(parse_time_field("UNLIMITED"), None);
        assert_eq!(parse_time_field("Partition_Limit"), None);
        assert_eq!(parse_time_field(""), None);
        assert_eq!(parse_time_field("1-00:00"), None);
        assert_eq!(parse_time_field("106751991167301-00:00:00"), None);
        assert_eq!(parse_time_field("99999999999999999999:00"), None);
    }

    #[test]
    fn datetimes_accept_any_separator() {
        assert_eq!(
            parse_datetime("2015-06-26T13:57:00"),
            FieldValue::Int(1_435_327_020)
        );
        assert_eq!(
            parse_datetime("2015-06-26 13:57:00"),
            FieldValue::Int(1_435_327_020)
        );
        assert_eq!(parse_datetime("Unknown"), FieldValue::Null);
    }

    #[test]
    fn first_node_handles_nodesets() {
        assert_eq!(first_node("node2,node1"), "node2");
        assert_eq!(first_node("node6,node[10-20]"), "node6");
        assert_eq!(first_node("node[10-20],node30"), "node10");
        assert_eq!(first_node("node[3,5]"), "node3");
        assert_eq!(first_node("single"), "single");
    }

    #[test]
    fn job_arrays_expand_ranges() {
        assert_eq!(split_job_id("123").expect("plain"), (123, vec![]));
        assert_eq!(split_job_id("123_4").expect("single"), (123, vec![4]));
        assert_eq!(
            split_job_id("123_[1,3-5]").expect("range"),
            (123, vec![1, 3, 4, 5])
        );
        assert!(split_job_id("_12").is_err());
        assert!(split_job_id("12_").is_err());
        assert!(split_job_id("12_[a]").is_err());
        assert!(split_job_id("12_[0-9223372036854775806]").is_err());
        assert!(split_job_id("12_[0-4000001]").is_err());
    }

    #[test]
    fn gpu_count_prefers_untyped_gres() {
        assert_eq!(gpu_count_from_tres("cpu=48,mem=144000M,node=4"), 0);
        assert_eq!(gpu_count_from_tres("cpu=8,gres/gpu=2,gres/gpu:v100=2"), 2);
        assert_eq!(gpu_count_from_tres("gres/gpu:k80=1,gres/gpu:p100=3"), 4);
    }

    #[test]
    fn unknown_states_are_skipped() {
        let mut state = ParseState::default();
        let line = "1|1|c|p|q|a|g|1|u|1|2015-06-26T13:57:00|2015-06-26T13:57:00|2015-06-26T13:57:00|2015-06-26T14:57:00|01:00:00|0:0|WEIRD|1|1|1|1Gn|||01:00:00|n1|job";
        for _ in 0..2 {
            let parsed = parse_line(line, &mut state).expect("parse");
            assert!(matches!(parsed, Parsed::Skip(_)));
        }
        assert!(state.unknown_states.contains("WEIRD"));
    }
}
