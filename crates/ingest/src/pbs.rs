use chrono::NaiveDateTime;
use tracing::{debug, error, warn};
use warehouse_core::{FieldValue, ShreddedRecord};

use crate::parsed::{Parsed, ParsedJob};
use crate::types::{Result, ShredError};

pub(crate) const COLUMNS: &[&str] = &[
    "job_id",
    "job_array_index",
    "host",
    "queue",
    "user",
    "groupname",
    "ctime",
    "qtime",
    "start",
    "end",
    "etime",
    "exit_status",
    "session",
    "requestor",
    "jobname",
    "owner",
    "account",
    "session_id",
    "error_path",
    "output_path",
    "exec_host",
    "resources_used_vmem",
    "resources_used_mem",
    "resources_used_walltime",
    "resources_used_nodes",
    "resources_used_cpus",
    "resources_used_gpus",
    "resources_used_cput",
    "resource_list_nodes",
    "resource_list_procs",
    "resource_list_neednodes",
    "resource_list_pcput",
    "resource_list_cput",
    "resource_list_walltime",
    "resource_list_ncpus",
    "resource_list_nodect",
    "resource_list_mem",
    "resource_list_pmem",
    "node_list",
];

// Wall time is end - start; resources_used_walltime is occasionally wrong.
pub(crate) const COLUMN_MAP: &[(&str, &str)] = &[
    ("date_key", "date(\"end\", 'unixepoch')"),
    ("job_id", "job_id"),
    ("job_array_index", "NULLIF(job_array_index, -1)"),
    ("job_id_raw", "CAST(job_id AS TEXT)"),
    ("job_name", "jobname"),
    ("resource_name", "host"),
    ("queue_name", "queue"),
    ("user_name", "user"),
    ("group_name", "groupname"),
    ("account_name", "account"),
    ("pi_name", "groupname"),
    ("start_time", "start"),
    ("end_time", "\"end\""),
    ("submission_time", "ctime"),
    ("eligible_time", "etime"),
    ("exit_code", "CAST(exit_status AS TEXT)"),
    ("wall_time", "MAX(\"end\" - start, 0)"),
    ("wait_time", "MAX(start - ctime, 0)"),
    ("node_count", "resources_used_nodes"),
    ("cpu_count", "resources_used_cpus"),
    ("gpu_count", "resources_used_gpus"),
    ("cpu_req", "resource_list_ncpus"),
    ("mem_req", "CAST(resource_list_mem AS TEXT)"),
    ("timelimit", "resource_list_walltime"),
    ("node_list", "node_list"),
];

const TIME_COLUMNS: &[&str] = &[
    "resources_used_walltime",
    "resources_used_cput",
    "resource_list_pcput",
    "resource_list_cput",
    "resource_list_walltime",
];

const MEMORY_COLUMNS: &[&str] = &[
    "resources_used_vmem",
    "resources_used_mem",
    "resource_list_mem",
    "resource_list_pmem",
];

pub(crate) fn parse_line(line: &str) -> Result<Parsed> {
    let malformed = || ShredError::parse(format!("Malformed PBS accounting line: '{}'", line));

    let mut parts = line.splitn(4, ';');
    let (Some(stamp), Some(event_type), Some(id_string), Some(params)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let valid_type = event_type.len() == 1
        && event_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if stamp.len() != 19
        || NaiveDateTime::parse_from_str(stamp, "%m/%d/%Y %H:%M:%S").is_err()
        || !valid_type
        || id_string.is_empty()
    {
        return Err(malformed());
    }

    if event_type != "E" {
        return Ok(Parsed::Skip(format!("event type '{}'", event_type)));
    }

    let mut record = ShreddedRecord::new();
    let (job_id, array_index) = parse_job_id(id_string);
    record.set("job_id", job_id);
    if let Some(index) = array_index {
        record.set("job_array_index", index);
    }

    let mut first_host = None;
    for param in params.split_whitespace() {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.replace('.', "_").to_ascii_lowercase();

        if key == "exec_host" {
            let hosts = parse_exec_host(value).map_err(|message| {
                ShredError::parse(format!("Failed to parse exec_host '{}': {}", value, message))
            })?;
            first_host = hosts.nodes.first().cloned();
            record.set("node_list", hosts.nodes.join(","));
            record.set("resources_used_nodes", hosts.node_count() as i64);
            record.set("resources_used_cpus", hosts.cpu_count);
        } else if TIME_COLUMNS.contains(&key.as_str()) {
            let parsed = parse_time(value);
            record.set(key.as_str(), log_failure(&key, value, parsed));
        } else if MEMORY_COLUMNS.contains(&key.as_str()) {
            let parsed = parse_memory(value);
            record.set(key.as_str(), log_failure(&key, value, parsed));
        } else if key == "group" {
            record.set("groupname", value);
        } else {
            record.set(key, value);
        }
    }

    record.set("resources_used_gpus", gpu_count(&record));

    let unknown: Vec<String> = record
        .iter()
        .map(|(key, _)| key)
        .filter(|key| !COLUMNS.contains(key))
        .map(str::to_string)
        .collect();
    for key in unknown {
        debug!(attribute = %key, "Ignoring unknown attribute");
        record.remove(&key);
    }

    Ok(Parsed::Job(ParsedJob::single(record, first_host)))
}

fn log_failure(key: &str, value: &str, parsed: std::result::Result<i64, String>) -> FieldValue {
    match parsed {
        Ok(parsed) => FieldValue::Int(parsed),
        Err(message) => {
            error!("Failed to parse '{}' value '{}': {}", key, value, message);
            FieldValue::Null
        }
    }
}

/// `seq.host`, `seq[idx]`, `seq[]` and `seq-idx` id strings.
fn parse_job_id(id_string: &str) -> (String, Option<i64>) {
    let sequence = id_string.split('.').next().unwrap_or(id_string);
    let digits = |value: &str| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());

    if let Some(inner) = sequence.strip_suffix(']')
        && let Some((job_id, index)) = inner.split_once('[')
        && digits(job_id)
        && (index.is_empty() || digits(index))
    {
        return (job_id.to_string(), index.parse().ok());
    }
    if let Some((job_id, index)) = sequence.split_once('-')
        && digits(job_id)
        && digits(index)
    {
        return (job_id.to_string(), index.parse().ok());
    }
    if !digits(sequence) {
        warn!(id_string, "Unknown id_string format");
    }
    (sequence.to_string(), None)
}

struct ExecHosts {
    /// Distinct hosts in allocation order.
    nodes: Vec<String>,
    cpu_count: i64,
}

impl ExecHosts {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Largest cpu count accepted for a single job.
const MAX_EXEC_CPUS: i64 = 100_000_000;

/// Parses `host/0+host/1`, `host/0,1`, `host/0-2` and PBS Pro `vnode/0*2`.
fn parse_exec_host(hosts: &str) -> std::result::Result<ExecHosts, String> {
    let mut nodes: Vec<String> = Vec::new();
    let mut cpu_count: i64 = 0;
    for part in hosts.split('+') {
        let (host, cpu_list) = part.split_once('/').unwrap_or((part, "0"));
        for cpu_part in cpu_list.split(',') {
            let cpus = if let Some((min, max)) = cpu_part.split_once('-') {
                match (min.parse::<i64>(), max.parse::<i64>()) {
                    (Ok(min), Ok(max)) if max >= min => max
                        .checked_sub(min)
                        .and_then(|span| span.checked_add(1))
                        .ok_or_else(|| format!("cpu range '{}' is too large", cpu_part))?,
                    _ => 1,
                }
            } else if let Some((_, count)) = cpu_part.split_once('*') {
                count.parse::<i64>().unwrap_or(1)
            } else {
                1
            };
            cpu_count = cpu_count
                .checked_add(cpus)
                .filter(|total| *total <= MAX_EXEC_CPUS)
                .ok_or_else(|| format!("more than {} cpus", MAX_EXEC_CPUS))?;
            if cpus > 0 && !nodes.iter().any(|node| node == host) {
                nodes.push(host.to_string());
            }
        }
    }
    Ok(ExecHosts { nodes, cpu_count })
}

/// `HH:MM:SS` or a plain number of seconds.
pub(crate) fn parse_time(time: &str) -> std::result::Result<i64, String> {
    if time.contains(':') {
        let parts: Vec<&str> = time.split(':').collect();
        let [h, m, s] = parts.as_slice() else {
            return Err(format!("Unknown time format: '{}'", time));
        };
        let parse = |v: &str| {
            v.parse::<i64>()
                .map_err(|_| format!("Unknown time format: '{}'", time))
        };
        let (h, m, s) = (parse(h)?, parse(m)?, parse(s)?);
        h.checked_mul(3_600)
            .and_then(|total| total.checked_add(m.checked_mul(60)?))
            .and_then(|total| total.checked_add(s))
            .ok_or_else(|| format!("Time out of range: '{}'", time))
    } else {
        time.parse::<i64>()
            .map_err(|_| format!("Unknown time format: '{}'", time))
    }
}

/// A quantity with an optional unit suffix (kb when omitted) to bytes.
pub(crate) fn parse_memory(memory: &str) -> std::result::Result<i64, String> {
    let split = memory
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(memory.len());
    let (quantity, unit) = memory.split_at(split);
    let valid_quantity = !quantity.is_empty()
        && !quantity.ends_with('.')
        && quantity.matches('.').count() <= 1
        && !unit.chars().any(|c| c.is_ascii_digit());
    if !valid_quantity {
        return Err(format!("Unknown memory format: '{}'", memory));
    }
    let quantity: f64 = quantity
        .parse()
        .map_err(|_| format!("Unknown memory format: '{}'", memory))?;
    let unit = if unit.is_empty() { "kb" } else { unit };
    let multiplier: f64 = match unit {
        "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0_f64.powi(2),
        "gb" => 1024.0_f64.powi(3),
        "tb" => 1024.0_f64.powi(4),
        "w" => 8.0,
        "kw" => 8.0 * 1024.0,
        "mw" => 8.0 * 1024.0_f64.powi(2),
        "gw" => 8.0 * 1024.0_f64.powi(3),
        "tw" => 8.0 * 1024.0_f64.powi(4),
        _ => return Err(format!("Unknown memory unit: '{}'", unit)),
    };
    Ok((quantity * multiplier).floor() as i64)
}

/// GPUs requested through `nodes=N:ppn=P:gpus=G+...`, falling back to the
/// `gpus` and `ngpus` resource lists and then to a `nodect` node spec.
fn gpu_count(record: &ShreddedRecord) -> i64 {
    let from_nodes = record
        .get_str("resource_list_nodes")
        .map(gpus_from_node_spec)
        .unwrap_or(0);
    if from_nodes > 0 {
        return from_nodes;
    }
    ["resource_list_gpus", "resource_list_ngpus"]
        .iter()
        .find_map(|key| record.get_i64(key))
        .or_else(|| {
            record
                .get_str("resource_list_nodect")
                .map(gpus_from_node_spec)
        })
        .unwrap_or(0)
}

fn gpus_from_node_spec(spec: &str) -> i64 {
    spec.split('+')
        .map(|part| {
            let mut properties = part.split(':');
            let nodes = properties
                .next()
                .and_then(|first| first.parse::<i64>().ok())
                .unwrap_or(1);
            let gpus = properties
                .filter_map(|property| property.strip_prefix("gpus="))
                .find_map(|count| count.parse::<i64>().ok())
                .unwrap_or(0);
            nodes.saturating_mul(gpus)
        })
        .fold(0, i64::saturating_add)
}
