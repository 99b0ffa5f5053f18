//! Bulk table loading.
//!
//! Each canonical table is inserted with its column set re-validated against
//! the DDL's `PRAGMA table_info`, rows sorted by declared primary key for a
//! deterministic physical layout, through a single prepared statement.

use omnibus_core::{Table, Value};
use rusqlite::{params_from_iter, Connection};

use crate::{Error, Result};

pub fn quote_ident(name: &str) -> String {
  format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn value_to_sql(value: &Value) -> rusqlite::types::Value {
  match value {
    Value::Null => rusqlite::types::Value::Null,
    Value::Int(n) => rusqlite::types::Value::Integer(*n),
    Value::Real(r) => rusqlite::types::Value::Real(*r),
    Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
  }
}

/// Expected column names and primary-key columns (in key order) for a table
/// that must already exist in the schema.
pub fn expected_cols_and_pk(
  conn: &Connection,
  table: &str,
) -> Result<(Vec<String>, Vec<String>)> {
  let sql = format!("PRAGMA table_info({})", quote_ident(table));
  let mut stmt = conn.prepare(&sql)?;
  let mut info: Vec<(String, i64)> = stmt
    .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?
    .collect::<rusqlite::Result<_>>()?;

  if info.is_empty() {
    return Err(Error::TableMissingFromSchema { table: table.to_owned() });
  }

  let columns: Vec<String> = info.iter().map(|(name, _)| name.clone()).collect();
  info.sort_by_key(|&(_, pk)| pk);
  let pk: Vec<String> = info
    .into_iter()
    .filter(|&(_, pk)| pk > 0)
    .map(|(name, _)| name)
    .collect();
  Ok((columns, pk))
}

fn validate_columns(table: &str, expected: &[String], actual: &[String]) -> Result<()> {
  let missing: Vec<String> =
    expected.iter().filter(|c| !actual.contains(c)).cloned().collect();
  let extra: Vec<String> =
    actual.iter().filter(|c| !expected.contains(c)).cloned().collect();
  if missing.is_empty() && extra.is_empty() {
    return Ok(());
  }
  Err(Error::ColumnMismatch {
    table:    table.to_owned(),
    missing,
    extra,
    expected: expected.to_vec(),
    actual:   actual.to_vec(),
  })
}

/// Insert every row of `table` into its schema table. Returns the row count.
pub fn insert_table(
  conn: &Connection,
  table: &Table,
  batch_rows: usize,
) -> Result<usize> {
  let (expected, pk) = expected_cols_and_pk(conn, table.name())?;
  validate_columns(table.name(), &expected, table.columns())?;

  // Bind in schema column order regardless of input order.
  let col_idx: Vec<usize> = expected
    .iter()
    .filter_map(|c| table.column_index(c))
    .collect();

  let sql = format!(
    "INSERT INTO {} ({}) VALUES ({})",
    quote_ident(table.name()),
    expected.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
    expected.iter().map(|_| "?").collect::<Vec<_>>().join(", "),
  );
  let mut stmt = conn.prepare(&sql)?;

  let pk_refs: Vec<&str> = pk.iter().map(String::as_str).collect();
  let order = table.sorted_indices(&pk_refs);

  for (done, row) in order.into_iter().enumerate() {
    let cells = &table.rows()[row];
    stmt.execute(params_from_iter(
      col_idx.iter().map(|&i| value_to_sql(&cells[i])),
    ))?;
    if batch_rows > 0 && (done + 1) % batch_rows == 0 {
      tracing::debug!(table = table.name(), rows = done + 1, "bulk load progress");
    }
  }

  Ok(table.len())
}
