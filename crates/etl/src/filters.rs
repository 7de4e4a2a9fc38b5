use tracing::{debug, info};
use warehouse_core::AggregationUnit;
use warehouse_db::{Db, quote_identifier};

use crate::aggregate::{Realm, table_name};
use crate::error::Result;

/// Rebuilds the `{realm}_{dimension}_filter_list` tables listing every
/// dimension value present in a realm's rollups.
pub struct FilterListBuilder {
    schema: String,
}

impl FilterListBuilder {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn list_table(realm: &dyn Realm, dimension: &str) -> String {
        format!("{}_{}_filter_list", realm.name().to_ascii_lowercase(), dimension)
    }

    pub fn build_realm_lists(&self, db: &mut Db, realm: &dyn Realm) -> Result<()> {
        let Some(source) = self.source_table(db, realm)? else {
            debug!(realm = realm.name(), "No rollup tables, skipping filter lists");
            return Ok(());
        };
        let schema = quote_identifier(&self.schema);
        let source = format!("{}.{}", schema, quote_identifier(&source));

        for dimension in realm.dimensions() {
            let table = format!(
                "{}.{}",
                schema,
                quote_identifier(&Self::list_table(realm, dimension.name))
            );
            let column = quote_identifier(dimension.name);
            db.execute_batch(&format!(
                "DROP TABLE IF EXISTS {table};\n\
                 CREATE TABLE {table} ({column} {sql_type} PRIMARY KEY);\n\
                 INSERT INTO {table} ({column}) SELECT DISTINCT {column} FROM {source} WHERE {column} IS NOT NULL;",
                sql_type = dimension.sql_type,
            ))?;
        }
        info!(
            realm = realm.name(),
            lists = realm.dimensions().len(),
            "Rebuilt filter lists"
        );
        Ok(())
    }

    // Every unit rolls up the same facts, so the finest existing table is
    // enough.
    fn source_table(&self, db: &Db, realm: &dyn Realm) -> Result<Option<String>> {
        for unit in AggregationUnit::ALL {
            let table = table_name(realm.table_prefix(), unit);
            if db.table_exists(&self.schema, &table)? {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }
}
