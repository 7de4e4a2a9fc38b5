use tracing::{debug, error};
use warehouse_core::{FieldValue, ShreddedRecord};

use crate::parsed::{Parsed, ParsedJob};
use crate::types::Result;

pub(crate) const COLUMNS: &[&str] = &[
    "clustername",
    "qname",
    "hostname",
    "groupname",
    "owner",
    "job_name",
    "job_number",
    "account",
    "priority",
    "submission_time",
    "start_time",
    "end_time",
    "failed",
    "exit_status",
    "ru_wallclock",
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
    "ru_msgsnd",
    "ru_msgrcv",
    "ru_nsignals",
    "ru_nvcsw",
    "ru_nivcsw",
    "project",
    "department",
    "granted_pe",
    "slots",
    "task_number",
    "cpu",
    "mem",
    "io",
    "category",
    "iow",
    "pe_taskid",
    "maxvmem",
    "arid",
    "ar_submission_time",
    "resource_list_arch",
    "resource_list_qname",
    "resource_list_hostname",
    "resource_list_notify",
    "resource_list_calendar",
    "resource_list_min_cpu_interval",
    "resource_list_tmpdir",
    "resource_list_seq_no",
    "resource_list_s_rt",
    "resource_list_h_rt",
    "resource_list_s_cpu",
    "resource_list_h_cpu",
    "resource_list_s_data",
    "resource_list_h_data",
    "resource_list_s_stack",
    "resource_list_h_stack",
    "resource_list_s_core",
    "resource_list_h_core",
    "resource_list_s_rss",
    "resource_list_h_rss",
    "resource_list_slots",
    "resource_list_s_vmem",
    "resource_list_h_vmem",
    "resource_list_s_fsize",
    "resource_list_h_fsize",
    "resource_list_num_proc",
    "resource_list_mem_free",
];

// A parallel job writes one line per host, so rows are grouped per task
// (see `INGEST_SUFFIX`) and the times and counts are aggregated.
pub(crate) const COLUMN_MAP: &[(&str, &str)] = &[
    ("date_key", "date(MAX(end_time), 'unixepoch')"),
    ("job_id", "job_number"),
    ("job_array_index", "NULLIF(task_number, 0)"),
    ("job_id_raw", "CAST(job_number AS TEXT)"),
    ("job_name", "job_name"),
    ("resource_name", "clustername"),
    ("queue_name", "qname"),
    ("user_name", "owner"),
    ("group_name", "groupname"),
    ("account_name", "account"),
    ("project_name", "project"),
    ("pi_name", "groupname"),
    ("start_time", "MIN(start_time)"),
    ("end_time", "MAX(end_time)"),
    ("submission_time", "MIN(submission_time)"),
    ("exit_code", "CAST(exit_status AS TEXT)"),
    ("exit_state", "CAST(failed AS TEXT)"),
    ("wall_time", "MAX(MAX(end_time) - MIN(start_time), 0)"),
    ("wait_time", "MAX(MIN(start_time) - MIN(submission_time), 0)"),
    ("node_count", "COUNT(DISTINCT hostname)"),
    (
        "cpu_count",
        "MAX(IFNULL(MAX(slots), 1), IFNULL(MAX(resource_list_num_proc), 1))",
    ),
    ("node_list", "GROUP_CONCAT(DISTINCT hostname)"),
];

/// Appended to the ingest source query.
pub(crate) const INGEST_SUFFIX: &str = "AND start_time != 0\nGROUP BY job_number, task_number";

/// Accounting file entries, in order. Later Grid Engine releases append
/// fields (such as `job_class`) that are ignored.
const ENTRY_NAMES: &[&str] = &[
    "qname",
    "hostname",
    "groupname",
    "owner",
    "job_name",
    "job_number",
    "account",
    "priority",
    "submission_time",
    "start_time",
    "end_time",
    "failed",
    "exit_status",
    "ru_wallclock",
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
    "ru_msgsnd",
    "ru_msgrcv",
    "ru_nsignals",
    "ru_nvcsw",
    "ru_nivcsw",
    "project",
    "department",
    "granted_pe",
    "slots",
    "task_number",
    "cpu",
    "mem",
    "io",
    "category",
    "iow",
    "pe_taskid",
    "maxvmem",
    "arid",
    "ar_submission_time",
];

/// Fields present in the oldest supported release (SGE 6.1).
const MINIMUM_ENTRY_COUNT: usize = 43;

/// Numeric entries that may also read `NONE`.
const MIXED_TYPE_ENTRIES: &[&str] = &["pe_taskid"];

/// `-l` attributes kept as `resource_list_*` columns.
const RESOURCE_ATTRIBUTES: &[&str] = &[
    "arch",
    "qname",
    "hostname",
    "notify",
    "calendar",
    "min_cpu_interval",
    "tmpdir",
    "seq_no",
    "s_rt",
    "h_rt",
    "s_cpu",
    "h_cpu",
    "s_data",
    "h_data",
    "s_stack",
    "h_stack",
    "s_core",
    "h_core",
    "s_rss",
    "h_rss",
    "slots",
    "s_vmem",
    "h_vmem",
    "s_fsize",
    "h_fsize",
    "num_proc",
    "mem_free",
];

const MEMORY_ATTRIBUTES: &[&str] = &[
    "s_data", "h_data", "s_stack", "h_stack", "s_core", "h_core", "s_rss", "h_rss", "s_vmem",
    "h_vmem", "s_fsize", "h_fsize", "mem_free",
];

pub(crate) fn parse_line(line: &str) -> Result<Parsed> {
    if line.starts_with('#') {
        return Ok(Parsed::Skip("comment".to_string()));
    }
    if line.len() <= 1 {
        return Ok(Parsed::Skip("line too short".to_string()));
    }

    let entries: Vec<&str> = line.split(':').collect();
    debug!(count = entries.len(), "Line contains fields");
    if entries.len() < MINIMUM_ENTRY_COUNT {
        error!(
            "Expected at least {} fields, found {} in line: {}",
            MINIMUM_ENTRY_COUNT,
            entries.len(),
            line
        );
        return Ok(Parsed::Skip("too few fields".to_string()));
    }

    let mut record = ShreddedRecord::new();
    for (name, value) in ENTRY_NAMES.iter().zip(entries.iter()) {
        if MIXED_TYPE_ENTRIES.contains(name) && *value == "NONE" {
            record.set(*name, FieldValue::Null);
        } else {
            record.set(*name, *value);
        }
    }

    if let Some(category) = record.get_str("category").map(str::to_string) {
        for (column, value) in resource_lists(&category) {
            record.set(column, value);
        }
    }

    let first_host = record.get_str("hostname").map(str::to_string);
    Ok(Parsed::Job(ParsedJob::single(record, first_host)))
}

/// `resource_list_*` values from the submission flags in `category`, e.g.
/// `-U users -l h_rt=3600,h_vmem=2G -pe mpi 8`.
fn resource_lists(category: &str) -> Vec<(String, FieldValue)> {
    if category.is_empty() || category == "NONE" {
        return Vec::new();
    }

    let mut lists = Vec::new();
    for (flag, value) in split_flags(category) {
        match flag {
            "-l" => lists.extend(resource_list_options(&value)),
            "-pe" => {
                // `<environment> <slots>`
                if let Some(slots) = value.split_whitespace().nth(1) {
                    lists.push(("resource_list_slots".to_string(), FieldValue::from(slots)));
                }
            }
            _ => {}
        }
    }
    lists
}

/// Splits on whitespace that precedes a `-flag`, keeping each flag with the
/// words that follow it.
fn split_flags(category: &str) -> Vec<(&str, String)> {
    let mut parts: Vec<(&str, Vec<&str>)> = Vec::new();
    for word in category.split_whitespace() {
        let is_flag = word.len() > 1
            && word.starts_with('-')
            && word[1..].starts_with(|c: char| c.is_alphanumeric() || c == '_');
        match parts.last_mut() {
            Some((_, words)) if !is_flag => words.push(word),
            _ => parts.push((word, Vec::new())),
        }
    }
    parts
        .into_iter()
        .map(|(flag, words)| (flag, words.join(" ")))
        .collect()
}

fn resource_list_options(options: &str) -> Vec<(String, FieldValue)> {
    let mut resources = Vec::new();
    for option in options.split(',') {
        let Some((key, value)) = option.split_once('=') else {
            debug!(option, "Resource option without a value");
            continue;
        };
        if !RESOURCE_ATTRIBUTES.contains(&key) {
            debug!(attribute = key, "Unknown resource attribute");
            continue;
        }
        let value = if MEMORY_ATTRIBUTES.contains(&key) {
            match parse_memory(value) {
                Ok(kilobytes) => FieldValue::Int(kilobytes),
                Err(message) => {
                    error!("Failed to parse '{}' value '{}': {}", key, value, message);
                    FieldValue::Null
                }
            }
        } else {
            FieldValue::from(value)
        };
        resources.push((format!("resource_list_{}", key), value));
    }
    resources
}

/// A Grid Engine memory quantity in kilobytes. Bytes when no unit is given;
/// lowercase units are powers of 1000, uppercase powers of 1024.
/// `INFINITY` is stored as 0.
fn parse_memory(memory: &str) -> std::result::Result<i64, String> {
    if memory == "INFINITY" {
        return Ok(0);
    }
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
    let multiplier: f64 = match unit {
        "" | "b" => 1.0,
        "k" => 1e3,
        "K" => 1024.0,
        "m" => 1e6,
        "M" => 1024.0_f64.powi(2),
        "g" => 1e9,
        "G" => 1024.0_f64.powi(3),
        _ => return Err(format!("Unknown memory unit: '{}'", unit)),
    };
    Ok((quantity * multiplier / 1024.0).floor() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_units_follow_case() {
        assert_eq!(parse_memory("2G"), Ok(2_097_152));
        assert_eq!(parse_memory("2g"), Ok(1_953_125));
        assert_eq!(parse_memory("1024"), Ok(1));
        assert_eq!(parse_memory("1.5K"), Ok(1));
        assert_eq!(parse_memory("INFINITY"), Ok(0));
        assert!(parse_memory("lots").is_err());
        assert!(parse_memory("4T").is_err());
    }

    #[test]
    fn category_flags_become_resource_lists() {
        let lists = resource_lists("-U users -l h_rt=7200,h_vmem=2G,gpu=1 -pe mpi 8 -q all.q");
        assert_eq!(
            lists,
            vec![
                ("resource_list_h_rt".to_string(), FieldValue::from("7200")),
                ("resource_list_h_vmem".to_string(), FieldValue::Int(2_097_152)),
                ("resource_list_slots".to_string(), FieldValue::from("8")),
            ]
        );
        assert!(resource_lists("NONE").is_empty());
    }

    #[test]
    fn comments_and_short_lines_are_skipped() {
        assert!(matches!(parse_line("# Version: 6.2u5"), Ok(Parsed::Skip(_))));
        assert!(matches!(parse_line("x"), Ok(Parsed::Skip(_))));
        assert!(matches!(parse_line("all.q:host:grp"), Ok(Parsed::Skip(_))));
    }
}
