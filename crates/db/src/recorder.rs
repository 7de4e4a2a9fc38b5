use std::sync::{Arc, Mutex};

use crate::types::{RecordedQuery, Value};

const MASK: &str = "********";
const SECRET_MARKERS: &[&str] = &["password", "passwd", "secret", "token"];

/// Debug log of executed statements, owned by whoever attaches it to a `Db`.
///
/// Clones share the same log, so a test can keep one handle and hand the
/// other to the connection under test.
#[derive(Debug, Clone, Default)]
pub struct QueryRecorder {
    entries: Arc<Mutex<Vec<RecordedQuery>>>,
}

impl QueryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<RecordedQuery> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub(crate) fn record(&self, query: RecordedQuery) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(query);
        }
    }
}

pub(crate) fn is_secret_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Renders bound parameters for logs, hiding password-like values.
pub(crate) fn display_params<'a>(
    params: impl IntoIterator<Item = (String, &'a Value)>,
) -> Vec<(String, String)> {
    params
        .into_iter()
        .map(|(name, value)| {
            let shown = if is_secret_name(&name) {
                MASK.to_string()
            } else {
                display_value(value)
            };
            (name, shown)
        })
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => format!("'{}'", value),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}
