use tracing::debug;
use warehouse_core::{FieldValue, ShreddedRecord};

use crate::format::DataMap;

/// Start, end and wall time of a job, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimes {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub walltime: Option<i64>,
}

/// Returns the messages for inconsistent times and whether the times need
/// repair. A missing wall time needs repair but is not reported.
pub fn check_job_times(times: JobTimes) -> (Vec<String>, bool) {
    let mut messages = Vec::new();
    let mut valid = true;

    if times.walltime.is_none() {
        valid = false;
    }
    match times.start {
        None => {
            messages.push("Job start time is missing.".to_string());
            valid = false;
        }
        Some(0) => {
            messages.push("Job start time is 0.".to_string());
            valid = false;
        }
        Some(_) => {}
    }
    match times.end {
        None => {
            messages.push("Job end time is missing.".to_string());
            valid = false;
        }
        Some(0) => {
            messages.push("Job end time is 0.".to_string());
            valid = false;
        }
        Some(_) => {}
    }
    if let (Some(start), Some(end)) = (times.start, times.end)
        && start > end
    {
        messages.push("Job start time as after job end time.".to_string());
        valid = false;
    }

    (messages, valid)
}

/// Derives one missing or inconsistent value from the other two. Gives up
/// when more than one value is unusable.
pub fn fix_job_times(times: JobTimes) -> Option<JobTimes> {
    let start = times.start.unwrap_or(0);
    let end = times.end.unwrap_or(0);
    let invalid = [start == 0, end == 0, times.walltime.is_none()]
        .iter()
        .filter(|flag| **flag)
        .count();
    if invalid > 1 {
        return None;
    }

    let walltime = times.walltime.unwrap_or_else(|| (end - start).max(0));
    let (mut start, mut end) = (start, end);
    if start == 0 {
        start = end - walltime;
    }
    if end == 0 {
        end = start + walltime;
    }
    if start > end {
        start = end - walltime;
    }

    Some(JobTimes {
        start: Some(start),
        end: Some(end),
        walltime: Some(walltime),
    })
}

pub fn check_nodes_and_cpus(nodes: i64, cpus: i64) -> Vec<String> {
    let mut messages = Vec::new();
    if nodes == 0 {
        messages.push("Job node count is 0.".to_string());
    }
    if cpus == 0 {
        messages.push("Job cpu count is 0.".to_string());
    }
    if nodes > cpus {
        messages.push(format!(
            "Job node count greater than cpu count ({} > {}).",
            nodes, cpus
        ));
    }
    messages
}

pub fn fix_nodes_and_cpus(nodes: i64, cpus: i64) -> (i64, i64) {
    if nodes == 0 && cpus == 0 {
        return (1, 1);
    }
    if cpus < nodes {
        return (nodes, nodes);
    }
    (nodes, cpus)
}

/// Validates a staging record in place, returning the messages to report.
pub(crate) fn check_job_data(
    record: &mut ShreddedRecord,
    map: DataMap,
    repair_node_cpu_counts: bool,
) -> Vec<String> {
    let times = JobTimes {
        start: record.get_i64(map.start_time),
        end: record.get_i64(map.end_time),
        walltime: map.walltime.and_then(|column| record.get_i64(column)),
    };
    let (mut messages, valid) = check_job_times(times);

    if !valid && let Some(walltime_column) = map.walltime {
        match fix_job_times(times) {
            Some(fixed) => {
                debug!(?times, ?fixed, "Repaired job times");
                record.set(map.start_time, FieldValue::from(fixed.start));
                record.set(map.end_time, FieldValue::from(fixed.end));
                record.set(walltime_column, FieldValue::from(fixed.walltime));
            }
            None => debug!(?times, "Job times could not be repaired"),
        }
    }

    // Formats that log one line per host have no per-job counts.
    let (Some(nodes_column), Some(cpus_column)) = (map.nodes, map.cpus) else {
        return messages;
    };
    let nodes = record.get_i64(nodes_column).unwrap_or(0);
    let cpus = record.get_i64(cpus_column).unwrap_or(0);
    messages.extend(check_nodes_and_cpus(nodes, cpus));
    if repair_node_cpu_counts {
        let (fixed_nodes, fixed_cpus) = fix_nodes_and_cpus(nodes, cpus);
        if (fixed_nodes, fixed_cpus) != (nodes, cpus) {
            record.set(nodes_column, fixed_nodes);
            record.set(cpus_column, fixed_cpus);
        }
    }

    messages
}
