use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use warehouse_db::Value;

use crate::error::{PipelineError, Result};

pub const START_DATE: &str = "start-date";
pub const END_DATE: &str = "end-date";
pub const LAST_MODIFIED_START_DATE: &str = "last-modified-start-date";

/// String parameters handed to every action of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineParams {
    values: BTreeMap<String, String>,
}

impl PipelineParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `YYYY-MM-DD HH:MM:SS` parameter as a datetime.
    pub fn datetime(&self, name: &str) -> Result<Option<NaiveDateTime>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
            .map(Some)
            .map_err(|_| PipelineError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
            })
    }

    /// Bind values for SQL, `last-modified-start-date` becoming
    /// `:last_modified_start_date`.
    pub fn to_named(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|(name, value)| (name.replace('-', "_"), Value::Text(value.clone())))
            .collect()
    }
}
