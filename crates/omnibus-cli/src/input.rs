//! Mechanical CSV table loading.
//!
//! Upstream stages hand over one `<table>.csv` per canonical table, with an
//! optional `<table>.meta.json` companion (row count, content hash, schema
//! hash). Cell typing is inferred: integer first, then real, then text;
//! empty fields are NULL. No cleaning or key derivation happens here.

use std::path::Path;

use anyhow::{Context as _, Result};
use omnibus_core::fs::sha256_file;
use omnibus_core::{Table, TableMeta, Tables, Value};

pub fn parse_cell(raw: &str) -> Value {
  if raw.is_empty() {
    return Value::Null;
  }
  if let Ok(n) = raw.parse::<i64>() {
    return Value::Int(n);
  }
  if let Ok(r) = raw.parse::<f64>() {
    return Value::Real(r);
  }
  Value::Text(raw.to_owned())
}

pub fn load_table_csv(path: &Path) -> Result<Table> {
  let name = path
    .file_stem()
    .and_then(|s| s.to_str())
    .context("table file has no stem")?
    .to_owned();

  let mut reader = csv::Reader::from_path(path)
    .with_context(|| format!("opening {}", path.display()))?;
  let headers: Vec<String> =
    reader.headers()?.iter().map(str::to_owned).collect();

  let mut table = Table::new(name, headers);
  for record in reader.records() {
    let record =
      record.with_context(|| format!("reading {}", path.display()))?;
    table.push_row(record.iter().map(parse_cell).collect())?;
  }
  Ok(table)
}

/// Load every `*.csv` in a directory, verifying any `<table>.meta.json`
/// companion against the file content and the loaded rows. A missing
/// directory is an empty table set, matching how optional side-table
/// directories behave.
pub fn load_tables_dir(dir: &Path) -> Result<Tables> {
  let mut tables = Tables::new();
  if !dir.is_dir() {
    return Ok(tables);
  }

  let mut paths: Vec<_> = std::fs::read_dir(dir)
    .with_context(|| format!("listing {}", dir.display()))?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
    .collect();
  paths.sort();

  for path in paths {
    let table = load_table_csv(&path)?;

    let meta_path = path.with_extension("meta.json");
    if meta_path.exists() {
      let raw = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
      let meta: TableMeta = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", meta_path.display()))?;

      let content = sha256_file(&path)?;
      if content != meta.content_sha256 {
        anyhow::bail!(
          "content hash mismatch for {}: companion declares {}, file is {}",
          path.display(),
          meta.content_sha256,
          content,
        );
      }
      meta.verify(&table)?;
    }

    tracing::debug!(
      table = table.name(),
      rows = table.len(),
      "loaded input table"
    );
    tables.insert(table.name().to_owned(), table);
  }
  Ok(tables)
}
