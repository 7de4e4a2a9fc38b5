use tracing::{debug, info};
use warehouse_db::{Db, DbError, Value, quote_identifier};

use crate::types::IngestorStats;

const PROGRESS_INTERVAL: usize = 10_000;

/// What to clear from the target table before loading.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteDirective {
    Retain,
    Truncate,
    Statement {
        sql: String,
        params: Vec<(String, Value)>,
    },
}

/// Copies the rows of a source query into a target table.
///
/// Rows colliding with an existing unique key are ignored, so re-running an
/// ingestor over the same source never duplicates target rows.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalIngestor {
    pub source_query: String,
    pub source_params: Vec<(String, Value)>,
    pub target_table: String,
    pub insert_fields: Vec<String>,
    pub delete: DeleteDirective,
}

impl IncrementalIngestor {
    pub fn new(
        source_query: impl Into<String>,
        target_table: impl Into<String>,
        insert_fields: Vec<String>,
    ) -> Self {
        Self {
            source_query: source_query.into(),
            source_params: Vec::new(),
            target_table: target_table.into(),
            insert_fields,
            delete: DeleteDirective::Retain,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, Value)>) -> Self {
        self.source_params = params;
        self
    }

    pub fn with_delete(mut self, delete: DeleteDirective) -> Self {
        self.delete = delete;
        self
    }

    fn insert_statement(&self) -> String {
        let columns = self
            .insert_fields
            .iter()
            .map(|field| quote_identifier(field))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=self.insert_fields.len())
            .map(|idx| format!("?{}", idx))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            quote_identifier(&self.target_table),
            columns,
            placeholders
        )
    }

    pub fn run(&self, db: &mut Db) -> Result<IngestorStats, DbError> {
        debug!(target_table = %self.target_table, "Running ingestor");
        let stats = db.transaction(|db| {
            match &self.delete {
                DeleteDirective::Retain => {}
                DeleteDirective::Truncate => {
                    db.truncate_table(&self.target_table)?;
                }
                DeleteDirective::Statement { sql, params } => {
                    let params = borrow_params(params);
                    let deleted = db.execute_named(sql, &params)?;
                    debug!(deleted, "Ingestor delete statement");
                }
            }

            let source_params = borrow_params(&self.source_params);
            let insert = self.insert_statement();

            let mut stats = IngestorStats::default();
            db.for_each_named(&self.source_query, &source_params, |row| {
                let values: Vec<Value> = self
                    .insert_fields
                    .iter()
                    .map(|field| row.value(field))
                    .collect();
                stats.records_loaded += db.execute(&insert, &values)?;
                stats.records_examined += 1;
                if stats.records_examined % PROGRESS_INTERVAL == 0 {
                    debug!(
                        examined = stats.records_examined,
                        loaded = stats.records_loaded,
                        "Ingestor progress"
                    );
                }
                Ok(())
            })?;
            Ok::<_, DbError>(stats)
        })?;

        info!(
            target_table = %self.target_table,
            records_examined = stats.records_examined,
            records_loaded = stats.records_loaded,
            "Ingestion complete"
        );
        Ok(stats)
    }
}

fn borrow_params(params: &[(String, Value)]) -> Vec<(&str, Value)> {
    params
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect()
}
