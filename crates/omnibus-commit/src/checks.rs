//! Post-load structural integrity checks.
//!
//! These run against the fully-loaded store after constraints are
//! re-enabled, as a stricter superset of the pre-commit validation engine.
//! Any failure aborts the build.

use rusqlite::Connection;

use crate::{Error, Result};

const PREVIEW_ROWS: usize = 25;
const CHECK_LIMIT: usize = 50;

pub fn run_integrity_checks(conn: &Connection) -> Result<()> {
  integrity_check(conn)?;
  foreign_key_check(conn)?;
  pattern_stop_contiguity_check(conn)?;
  Ok(())
}

/// `PRAGMA integrity_check` — physical page/index consistency.
pub fn integrity_check(conn: &Connection) -> Result<()> {
  let verdict: String =
    conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
  if verdict != "ok" {
    return Err(Error::IntegrityCheckFailed { detail: verdict });
  }
  Ok(())
}

/// `PRAGMA foreign_key_check` — whole-database referential check, run once
/// at the end instead of row-by-row during bulk load.
pub fn foreign_key_check(conn: &Connection) -> Result<()> {
  let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
  let rows: Vec<(String, Option<i64>, String, i64)> = stmt
    .query_map([], |row| {
      Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })?
    .collect::<rusqlite::Result<_>>()?;

  if rows.is_empty() {
    return Ok(());
  }
  let preview = rows
    .iter()
    .take(PREVIEW_ROWS)
    .map(|(table, rowid, parent, fkid)| {
      format!(
        "table={table} rowid={} parent={parent} fkid={fkid}",
        rowid.map_or_else(|| "?".to_owned(), |r| r.to_string()),
      )
    })
    .collect::<Vec<_>>()
    .join("\n");
  Err(Error::ForeignKeyCheckFailed { count: rows.len() as u64, preview })
}

/// Strong invariant: `seq` is contiguous 1..N per pattern. Cheap, and holes
/// break stop-list rendering downstream.
pub fn pattern_stop_contiguity_check(conn: &Connection) -> Result<()> {
  let sql = format!(
    "SELECT pattern_id, min_seq, max_seq, cnt
     FROM (
       SELECT pattern_id,
              MIN(seq)  AS min_seq,
              MAX(seq)  AS max_seq,
              COUNT(*)  AS cnt
       FROM pattern_stops
       GROUP BY pattern_id
     )
     WHERE min_seq != 1 OR max_seq != cnt
     ORDER BY pattern_id
     LIMIT {CHECK_LIMIT}"
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows: Vec<(i64, i64, i64, i64)> = stmt
    .query_map([], |row| {
      Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })?
    .collect::<rusqlite::Result<_>>()?;

  if rows.is_empty() {
    return Ok(());
  }
  let preview = rows
    .iter()
    .take(PREVIEW_ROWS)
    .map(|(pattern_id, min_seq, max_seq, cnt)| {
      format!(
        "pattern_id={pattern_id} min_seq={min_seq} max_seq={max_seq} rows={cnt}"
      )
    })
    .collect::<Vec<_>>()
    .join("\n");
  Err(Error::ContiguityCheckFailed { count: rows.len() as u64, preview })
}
