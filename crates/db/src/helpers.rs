use rusqlite::{Params, Statement};

use crate::error::Result;
use crate::types::{Row, Value};

/// Quotes a table, column or schema name for interpolation into SQL text.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn named_key(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{}", name)
    }
}

/// Keeps only the named parameters the statement actually references.
pub(crate) fn bind_named<'p>(
    stmt: &Statement<'_>,
    params: &'p [(&str, Value)],
) -> Result<Vec<(String, &'p Value)>> {
    let mut bound = Vec::with_capacity(params.len());
    for (name, value) in params {
        let key = named_key(name);
        if stmt.parameter_index(&key)?.is_some() {
            bound.push((key, value));
        }
    }
    Ok(bound)
}

pub(crate) fn positional_names(params: &[Value]) -> impl Iterator<Item = (String, &Value)> {
    params
        .iter()
        .enumerate()
        .map(|(idx, value)| (format!("?{}", idx + 1), value))
}

pub(crate) fn read_rows<P: Params>(stmt: &mut Statement<'_>, params: P) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for_each_row(stmt, params, |row| {
        out.push(row);
        Ok(())
    })?;
    Ok(out)
}

/// Steps through the result set, handing each row to `f` as it is read.
pub(crate) fn for_each_row<P, F>(stmt: &mut Statement<'_>, params: P, mut f: F) -> Result<usize>
where
    P: Params,
    F: FnMut(Row) -> Result<()>,
{
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params)?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let mut pairs = Vec::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            pairs.push((name.clone(), Value::from(row.get_ref(idx)?)));
        }
        f(Row::from_pairs(pairs))?;
        count += 1;
    }
    Ok(count)
}

pub(crate) fn compact_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
