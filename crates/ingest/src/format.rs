use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use warehouse_core::ConfigError;
use warehouse_db::quote_identifier;

use crate::parsed::Parsed;
use crate::types::{Result, ShredError};
use crate::{lsf, pbs, sge, slurm, slurm_json};

/// Accounting log formats the shredder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Slurm,
    /// `sacct --json` output, staged alongside the text format.
    SlurmJson,
    Pbs,
    Lsf,
    Sge,
}

/// Staging columns holding the values `check_job_data` cross-validates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DataMap {
    pub job_id: &'static str,
    pub start_time: &'static str,
    pub end_time: &'static str,
    pub walltime: Option<&'static str>,
    pub nodes: Option<&'static str>,
    pub cpus: Option<&'static str>,
}

/// Per-format parser state that lives as long as the shredder.
#[derive(Debug, Default)]
pub(crate) struct ParseState {
    pub unknown_states: HashSet<String>,
}

impl Format {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "slurm" => Ok(Self::Slurm),
            "slurmjson" | "slurm-json" | "slurm_json" => Ok(Self::SlurmJson),
            "pbs" | "pbspro" | "torque" => Ok(Self::Pbs),
            "lsf" => Ok(Self::Lsf),
            "sge" => Ok(Self::Sge),
            _ => Err(ShredError::UnknownFormat(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Slurm => "slurm",
            Self::SlurmJson => "slurmjson",
            Self::Pbs => "pbs",
            Self::Lsf => "lsf",
            Self::Sge => "sge",
        }
    }

    /// Value of the generic table's `source_format`. Both Slurm formats
    /// share one staging table and therefore one set of generic rows.
    pub fn source_format(self) -> &'static str {
        match self {
            Self::Slurm | Self::SlurmJson => "slurm",
            other => other.name(),
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Slurm | Self::SlurmJson => "shredded_job_slurm",
            Self::Pbs => "shredded_job_pbs",
            Self::Lsf => "shredded_job_lsf",
            Self::Sge => "shredded_job_sge",
        }
    }

    pub fn primary_key(self) -> &'static str {
        match self {
            Self::Slurm | Self::SlurmJson => "shredded_job_slurm_id",
            Self::Pbs => "shredded_job_pbs_id",
            Self::Lsf => "shredded_job_lsf_id",
            Self::Sge => "shredded_job_sge_id",
        }
    }

    /// Columns of the staging table, excluding the primary key.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Slurm | Self::SlurmJson => slurm::COLUMNS,
            Self::Pbs => pbs::COLUMNS,
            Self::Lsf => lsf::COLUMNS,
            Self::Sge => sge::COLUMNS,
        }
    }

    /// Field names as the resource manager documents them, when the report
    /// header should list them.
    pub fn input_field_names(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Slurm => Some(slurm::FIELD_NAMES),
            Self::SlurmJson | Self::Pbs | Self::Lsf | Self::Sge => None,
        }
    }

    /// Staging column that is overwritten with the configured resource name.
    pub(crate) fn resource_column(self) -> &'static str {
        match self {
            Self::Slurm | Self::SlurmJson => "cluster_name",
            Self::Pbs => "host",
            Self::Lsf => "resource_name",
            Self::Sge => "clustername",
        }
    }

    /// False when jobs without any host must pass the host filter.
    pub(crate) fn filters_hostless_jobs(self) -> bool {
        !matches!(self, Self::Lsf)
    }

    /// SQL appended to the ingest source query after its WHERE clause.
    pub(crate) fn ingest_suffix(self) -> Option<&'static str> {
        match self {
            Self::Sge => Some(sge::INGEST_SUFFIX),
            _ => None,
        }
    }

    pub(crate) fn data_map(self) -> DataMap {
        match self {
            Self::Slurm | Self::SlurmJson => DataMap {
                job_id: "job_id",
                start_time: "start_time",
                end_time: "end_time",
                walltime: Some("elapsed"),
                nodes: Some("nnodes"),
                cpus: Some("ncpus"),
            },
            Self::Pbs => DataMap {
                job_id: "job_id",
                start_time: "start",
                end_time: "end",
                walltime: Some("resources_used_walltime"),
                nodes: Some("resources_used_nodes"),
                cpus: Some("resources_used_cpus"),
            },
            Self::Lsf => DataMap {
                job_id: "job_id",
                start_time: "start_time",
                end_time: "event_time",
                walltime: Some("walltime"),
                nodes: Some("num_ex_hosts"),
                cpus: Some("num_processors"),
            },
            Self::Sge => DataMap {
                job_id: "job_number",
                start_time: "start_time",
                end_time: "end_time",
                walltime: Some("ru_wallclock"),
                nodes: None,
                cpus: None,
            },
        }
    }

    fn default_column_map(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Slurm | Self::SlurmJson => slurm::COLUMN_MAP,
            Self::Pbs => pbs::COLUMN_MAP,
            Self::Lsf => lsf::COLUMN_MAP,
            Self::Sge => sge::COLUMN_MAP,
        }
    }

    /// Generic column map, with `pi_name` taken from `pi_column` when given.
    pub fn column_map(self, pi_column: Option<&str>) -> std::result::Result<ColumnMap, ConfigError> {
        let mut entries: Vec<(&'static str, String)> = self
            .default_column_map()
            .iter()
            .map(|(generic, expr)| (*generic, (*expr).to_string()))
            .collect();
        if let Some(pi_column) = pi_column {
            if !self.columns().contains(&pi_column) {
                return Err(ConfigError::Invalid(format!(
                    "pi_column '{}' is not a {} column",
                    pi_column,
                    self.name()
                )));
            }
            for (generic, expr) in entries.iter_mut() {
                if *generic == "pi_name" {
                    *expr = quote_identifier(pi_column);
                }
            }
        }
        Ok(ColumnMap { entries })
    }

    pub(crate) fn parse_line(self, line: &str, state: &mut ParseState) -> Result<Parsed> {
        match self {
            Self::Slurm => slurm::parse_line(line, state),
            Self::SlurmJson => slurm_json::parse_line(line, state),
            Self::Pbs => pbs::parse_line(line),
            Self::Lsf => lsf::parse_line(line),
            Self::Sge => sge::parse_line(line),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ShredError;

    fn from_str(value: &str) -> Result<Self> {
        Self::from_name(value)
    }
}

/// Generic column name to staging SQL expression, fixed per shredder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    entries: Vec<(&'static str, String)>,
}

impl ColumnMap {
    pub fn get(&self, generic: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| *name == generic)
            .map(|(_, expr)| expr.as_str())
    }

    pub fn generic_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    /// `expr AS "generic", ...` for a SELECT list.
    pub fn select_list(&self) -> String {
        self.entries
            .iter()
            .map(|(name, expr)| format!("{} AS {}", expr, quote_identifier(name)))
            .collect::<Vec<_>>()
            .join(",\n  ")
    }
}
