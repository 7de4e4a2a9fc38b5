use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A scalar parsed out of an accounting log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value. Text is parsed leniently the way the
    /// accounting logs write numbers ("1261424924", "60.0").
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Null => None,
            Self::Int(value) => Some(*value),
            Self::Real(value) => Some(*value as i64),
            Self::Text(value) => {
                let trimmed = value.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|value| value as i64))
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(value) => write!(f, "{}", value),
            Self::Real(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}

/// Format-specific field map for one job, keyed by staging column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShreddedRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl ShreddedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(FieldValue::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Validation failures for one input job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorRecord {
    pub job_id: Option<String>,
    pub input: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("No config found for '{0}'")]
    UnknownResource(String),
    #[error("invalid host filter '{pattern}': {message}")]
    InvalidHostFilter { pattern: String, message: String },
    #[error("unknown aggregation unit '{0}'")]
    UnknownUnit(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Static configuration for one compute resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub resource: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pi_column: Option<String>,
    #[serde(default)]
    pub host_filter: Option<String>,
}

impl ResourceConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_type: None,
            name: None,
            pi_column: None,
            host_filter: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceCatalog {
    resources: Vec<ResourceConfig>,
}

impl ResourceCatalog {
    pub fn new(resources: Vec<ResourceConfig>) -> Self {
        Self { resources }
    }

    pub fn lookup(&self, name: &str) -> Result<&ResourceConfig, ConfigError> {
        self.resources
            .iter()
            .find(|config| config.resource == name)
            .ok_or_else(|| ConfigError::UnknownResource(name.to_string()))
    }

    pub fn resources(&self) -> &[ResourceConfig] {
        &self.resources
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationUnit {
    Day,
    Month,
    Quarter,
    Year,
}

impl AggregationUnit {
    pub const ALL: [AggregationUnit; 4] = [Self::Day, Self::Month, Self::Quarter, Self::Year];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    /// First day of the period containing `date`.
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        let (year, month) = (date.year(), date.month());
        match self {
            Self::Day => date,
            Self::Month => NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date),
            Self::Quarter => {
                NaiveDate::from_ymd_opt(year, (month - 1) / 3 * 3 + 1, 1).unwrap_or(date)
            }
            Self::Year => NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(date),
        }
    }

    pub fn next_start(self, date: NaiveDate) -> Option<NaiveDate> {
        let start = self.period_start(date);
        match self {
            Self::Day => start.succ_opt(),
            Self::Month => start.checked_add_months(Months::new(1)),
            Self::Quarter => start.checked_add_months(Months::new(3)),
            Self::Year => start.checked_add_months(Months::new(12)),
        }
    }

    fn period_in_year(self, start: NaiveDate) -> u32 {
        match self {
            Self::Day => start.ordinal(),
            Self::Month => start.month(),
            Self::Quarter => (start.month() - 1) / 3 + 1,
            Self::Year => 0,
        }
    }

    pub fn period(self, date: NaiveDate) -> Option<TimePeriod> {
        let start = self.period_start(date);
        let next = self.next_start(start)?;
        let start_ts = midnight_ts(start);
        let end_ts = midnight_ts(next) - 1;
        let year = start.year();
        let period_in_year = self.period_in_year(start);
        Some(TimePeriod {
            unit: self,
            id: i64::from(year) * 100_000 + i64::from(period_in_year),
            year,
            period_in_year,
            start,
            start_ts,
            end_ts,
            seconds: end_ts - start_ts + 1,
        })
    }

    /// Every period of this unit overlapping `[start, end]`, in order.
    pub fn periods_between(self, start: NaiveDate, end: NaiveDate) -> Vec<TimePeriod> {
        let mut periods = Vec::new();
        let mut cursor = self.period_start(start);
        while cursor <= end {
            let Some(period) = self.period(cursor) else {
                break;
            };
            let Some(next) = self.next_start(cursor) else {
                periods.push(period);
                break;
            };
            periods.push(period);
            cursor = next;
        }
        periods
    }
}

impl fmt::Display for AggregationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationUnit {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            other => Err(ConfigError::UnknownUnit(other.to_string())),
        }
    }
}

/// One aggregation bucket. `end_ts` is the last second inside the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimePeriod {
    pub unit: AggregationUnit,
    pub id: i64,
    pub year: i32,
    pub period_in_year: u32,
    pub start: NaiveDate,
    pub start_ts: i64,
    pub end_ts: i64,
    pub seconds: i64,
}

fn midnight_ts(date: NaiveDate) -> i64 {
    NaiveDateTime::new(date, NaiveTime::MIN).and_utc().timestamp()
}

/// Formats a unix timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp(ts: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
