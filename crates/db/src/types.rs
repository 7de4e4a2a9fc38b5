use std::collections::BTreeMap;

pub use rusqlite::types::Value;

/// One result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Value for `column`, or `Value::Null` when the column is absent.
    pub fn value(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.values.get(column)? {
            Value::Integer(value) => Some(*value),
            Value::Real(value) => Some(*value as i64),
            Value::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_text(&self, column: &str) -> Option<String> {
        match self.values.get(column)? {
            Value::Text(value) => Some(value.clone()),
            Value::Integer(value) => Some(value.to_string()),
            Value::Real(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A statement captured by a [`crate::QueryRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<(String, String)>,
}
