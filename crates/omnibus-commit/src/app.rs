//! App-view builder.
//!
//! Derives the client-facing `app.sqlite` from a finished canonical bundle:
//! the canonical tables the app reads directly are copied as-is, and the raw
//! fare tables are replaced by compressed `fare_segments`. The output must
//! never carry `fare_rules` or `fare_amounts` alongside the segments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use omnibus_core::fs::{atomic_replace, utc_now_iso};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::config::CommitConfig;
use crate::schema::APP_DDL;
use crate::segments::{
  build_fare_segments, materialize_cells, FareAmountRow, FareRuleRow,
};
use crate::{Error, Result};

/// Canonical tables copied into the app view: explicit column list (the app
/// schema drops build-only columns such as `pattern_key`) and the ORDER BY
/// that keeps the physical layout deterministic.
const COPIED_TABLES: [(&str, &str, &str); 7] = [
  ("operators", "operator_id, operator_code, operator_name", "operator_id"),
  ("places", "place_id, place_key, name, lat, lon, parent_place_id", "place_id"),
  (
    "routes",
    "route_id, route_key, operator_id, mode, route_short_name, origin_text, \
     destination_text, journey_time_minutes",
    "route_id",
  ),
  (
    "route_patterns",
    "pattern_id, route_id, route_seq, direction_id, is_circular",
    "pattern_id",
  ),
  ("pattern_stops", "pattern_id, seq, place_id", "pattern_id, seq"),
  ("fare_products", "fare_product_id, mode, product_name", "fare_product_id"),
  (
    "pattern_headways",
    "pattern_id, service_id, start_time, end_time, headway_secs, sample_trip_id",
    "pattern_id, service_id, start_time, end_time",
  ),
];

#[derive(Debug, Clone, Serialize)]
pub struct AppBuildMetrics {
  pub row_counts: BTreeMap<String, u64>,
  pub fare_segments_rows: u64,
  pub build_ms: u64,
}

pub fn build_app_bundle(
  canonical_path: &Path,
  out_path: &Path,
  cfg: &CommitConfig,
) -> Result<AppBuildMetrics> {
  if !canonical_path.exists() {
    return Err(Error::MissingInput(canonical_path.to_path_buf()));
  }
  if let Some(parent) = out_path.parent() {
    std::fs::create_dir_all(parent).map_err(omnibus_core::Error::from)?;
  }

  let tmp = out_path.with_extension("tmp.sqlite");
  let _ = std::fs::remove_file(&tmp);

  let built = build_into(&tmp, canonical_path, cfg);
  for suffix in ["-wal", "-shm"] {
    let mut name = tmp.as_os_str().to_owned();
    name.push(suffix);
    let _ = std::fs::remove_file(PathBuf::from(name));
  }

  match built {
    Ok(metrics) => {
      atomic_replace(&tmp, out_path).map_err(Error::Core)?;
      tracing::info!(out = %out_path.display(), "app bundle published");
      Ok(metrics)
    }
    Err(err) => {
      let _ = std::fs::remove_file(&tmp);
      Err(err)
    }
  }
}

fn build_into(
  tmp: &Path,
  canonical_path: &Path,
  cfg: &CommitConfig,
) -> Result<AppBuildMetrics> {
  let started = Instant::now();
  let conn = Connection::open(tmp)?;

  conn.pragma_update(None, "journal_mode", "WAL")?;
  conn.pragma_update(None, "synchronous", "NORMAL")?;
  conn.pragma_update(None, "temp_store", "MEMORY")?;
  conn.pragma_update(None, "foreign_keys", false)?;

  conn.execute_batch(APP_DDL)?;

  conn.execute(
    "ATTACH DATABASE ?1 AS canon",
    [canonical_path.to_string_lossy().as_ref()],
  )?;

  // Read bundle identity from the canonical meta row.
  let (schema_version, bundle_version): (i64, String) = conn.query_row(
    "SELECT schema_version, bundle_version FROM canon.meta WHERE meta_id = 1",
    [],
    |row| Ok((row.get(0)?, row.get(1)?)),
  )?;

  for (table, columns, order_by) in COPIED_TABLES {
    conn.execute_batch(&format!(
      "INSERT INTO {table} ({columns})
       SELECT {columns} FROM canon.{table} ORDER BY {order_by};"
    ))?;
  }

  let segment_count = copy_fare_segments(&conn)?;

  conn.execute(
    "INSERT OR REPLACE INTO meta (
       meta_id, schema_version, bundle_version, generated_at, notes
     ) VALUES (1, ?1, ?2, ?3, 'app view build')",
    rusqlite::params![schema_version, bundle_version, utc_now_iso()],
  )?;

  conn.execute("DETACH DATABASE canon", [])?;

  if cfg.run_analyze {
    conn.execute_batch("ANALYZE;")?;
  }
  if cfg.run_vacuum {
    conn.execute_batch("VACUUM;")?;
  }
  conn.pragma_update(None, "foreign_keys", true)?;
  // Single-file output: end WAL before the atomic replace.
  conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
  conn.pragma_update(None, "journal_mode", "DELETE")?;

  let metrics = verify_and_measure(&conn, segment_count, started)?;
  conn.close().map_err(|(_, err)| Error::Sql(err))?;
  Ok(metrics)
}

/// Materialize fare segments from the canonical fare tables: choose one
/// amount per rule (default flag, else smallest product id), collapse
/// duplicate cells to the minimum amount, compress, insert.
fn copy_fare_segments(conn: &Connection) -> Result<u64> {
  let rules: Vec<FareRuleRow> = {
    let mut stmt = conn.prepare(
      "SELECT fare_rule_id, route_id, origin_seq, destination_seq
       FROM canon.fare_rules
       WHERE route_id IS NOT NULL
         AND origin_seq IS NOT NULL
         AND destination_seq IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| {
      Ok(FareRuleRow {
        fare_rule_id:    row.get(0)?,
        route_id:        row.get(1)?,
        origin_seq:      row.get(2)?,
        destination_seq: row.get(3)?,
      })
    })?;
    rows.collect::<rusqlite::Result<_>>()?
  };

  let amounts: Vec<FareAmountRow> = {
    let mut stmt = conn.prepare(
      "SELECT fare_rule_id, fare_product_id, amount_cents, is_default
       FROM canon.fare_amounts",
    )?;
    let rows = stmt.query_map([], |row| {
      Ok(FareAmountRow {
        fare_rule_id:    row.get(0)?,
        fare_product_id: row.get(1)?,
        amount_cents:    row.get(2)?,
        is_default:      row.get::<_, i64>(3)? != 0,
      })
    })?;
    rows.collect::<rusqlite::Result<_>>()?
  };

  let segments = build_fare_segments(materialize_cells(&rules, &amounts));

  let mut stmt = conn.prepare(
    "INSERT INTO fare_segments (
       route_id, fare_product_id, origin_seq, dest_from_seq, dest_to_seq,
       amount_cents, is_default
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  for seg in &segments {
    stmt.execute(rusqlite::params![
      seg.route_id,
      seg.fare_product_id,
      seg.origin_seq,
      seg.dest_from_seq,
      seg.dest_to_seq,
      seg.amount_cents,
      seg.is_default as i64,
    ])?;
  }

  tracing::info!(
    fare_rules = rules.len(),
    segments = segments.len(),
    "fare segments materialized"
  );
  Ok(segments.len() as u64)
}

/// The app view must not expose the raw fare tables; verify before publish.
fn verify_and_measure(
  conn: &Connection,
  segment_count: u64,
  started: Instant,
) -> Result<AppBuildMetrics> {
  let forbidden: Vec<String> = {
    let mut stmt = conn.prepare(
      "SELECT name FROM sqlite_master
       WHERE type = 'table' AND name IN ('fare_rules', 'fare_amounts')
       ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<_>>()?
  };
  if !forbidden.is_empty() {
    return Err(Error::AppViewContainsRawFares { tables: forbidden });
  }

  let mut row_counts = BTreeMap::new();
  for (table, _, _) in COPIED_TABLES {
    let count: i64 = conn.query_row(
      &format!("SELECT COUNT(*) FROM {table}"),
      [],
      |row| row.get(0),
    )?;
    row_counts.insert(table.to_owned(), count as u64);
  }

  Ok(AppBuildMetrics {
    row_counts,
    fare_segments_rows: segment_count,
    build_ms: started.elapsed().as_millis() as u64,
  })
}

/// Open a finished bundle read-only.
pub fn open_readonly(path: &Path) -> Result<Connection> {
  Ok(Connection::open_with_flags(
    path,
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
  )?)
}
