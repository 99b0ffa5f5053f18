//! Headway resolution.
//!
//! Projects upstream GTFS-keyed frequency records onto canonical
//! `pattern_id`s with no manual mapping step. Resolution never raises on
//! data problems — every input row either resolves or is counted under
//! exactly one unresolved reason; the caller decides whether nonzero counts
//! are fatal.
//!
//! Invariants:
//!   - an upstream id mapping to ≥2 canonical routes is ambiguous and is
//!     excluded entirely, never guessed;
//!   - best pattern per (route, direction) is max stop count, tie-broken by
//!     the numerically smallest pattern_id;
//!   - duplicate resolved keys aggregate by MIN(headway_secs) and
//!     MIN(sample_trip_id).
//!
//! These tie-breaks are load-bearing policy; downstream consumers depend on
//! them exactly.

use std::collections::{BTreeMap, BTreeSet};

use omnibus_core::Table;
use rusqlite::Connection;
use serde::Serialize;

use crate::{Error, Result};

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Resolution outcome. The four unresolved counters are disjoint: each
/// unresolved row is classified once, in reason-priority order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeadwayResolveStats {
  pub inserted_rows: u64,
  pub unresolved_missing_route: u64,
  pub unresolved_ambiguous_route: u64,
  pub unresolved_missing_route_seq: u64,
  pub unresolved_missing_pattern: u64,
}

impl HeadwayResolveStats {
  pub fn unresolved_total(&self) -> u64 {
    self.unresolved_missing_route
      + self.unresolved_ambiguous_route
      + self.unresolved_missing_route_seq
      + self.unresolved_missing_pattern
  }
}

// ─── Upstream id normalization ───────────────────────────────────────────────

/// Normalize a feed-specific route identifier: all-digit strings strip
/// leading zeros (an all-zero string is `0`) and parse as an integer;
/// anything else can never resolve.
pub fn normalize_upstream_route_id(raw: &str) -> Option<i64> {
  if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let trimmed = raw.trim_start_matches('0');
  if trimmed.is_empty() {
    return Some(0);
  }
  trimmed.parse().ok()
}

// ─── Mapping TEMP table ──────────────────────────────────────────────────────

const MAPPING_COLUMNS: [&str; 7] = [
  "source",
  "mode",
  "source_route_id",
  "source_file",
  "source_row",
  "route_id",
  "route_key",
];

/// (Re)create the TEMP mapping table, empty. It feeds resolution only and
/// is never persisted in the artifact.
pub fn create_mapping_table(conn: &Connection) -> Result<()> {
  conn.execute_batch(
    "DROP TABLE IF EXISTS temp.map_route_source;
     CREATE TEMP TABLE map_route_source (
       source          TEXT NOT NULL,
       mode            TEXT,
       source_route_id TEXT NOT NULL,
       source_file     TEXT,
       source_row      INTEGER,
       route_id        INTEGER,
       route_key       TEXT
     );
     CREATE INDEX temp.idx_map_route_source
       ON map_route_source(source, source_route_id);",
  )?;
  Ok(())
}

/// Load the source-identity mapping into the TEMP table.
pub fn load_mapping_table(conn: &Connection, mapping: &Table) -> Result<usize> {
  let missing: Vec<String> = MAPPING_COLUMNS
    .iter()
    .filter(|c| !mapping.has_column(c))
    .map(|c| (*c).to_owned())
    .collect();
  if !missing.is_empty() {
    return Err(Error::ColumnMismatch {
      table:    "map_route_source".to_owned(),
      missing,
      extra:    Vec::new(),
      expected: MAPPING_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
      actual:   mapping.columns().to_vec(),
    });
  }

  create_mapping_table(conn)?;

  let mut stmt = conn.prepare(
    "INSERT INTO map_route_source (
       source, mode, source_route_id, source_file, source_row, route_id, route_key
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  for row in 0..mapping.len() {
    stmt.execute(rusqlite::params_from_iter(
      MAPPING_COLUMNS
        .iter()
        .map(|c| crate::load::value_to_sql(mapping.cell(row, c))),
    ))?;
  }

  tracing::info!(rows = mapping.len(), "loaded TEMP mapping table");
  Ok(mapping.len())
}

// ─── Resolution ──────────────────────────────────────────────────────────────

struct FrequencyRow {
  upstream_route_id: i64,
  route_seq:         Option<i64>,
  service_id:        String,
  start_time:        String,
  end_time:          String,
  headway_secs:      i64,
  sample_trip_id:    Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnresolvedReason {
  MissingRouteSeq,
  AmbiguousUpstreamRouteId,
  MissingUpstreamRouteId,
  MissingPattern,
}

impl UnresolvedReason {
  fn as_str(self) -> &'static str {
    match self {
      Self::MissingRouteSeq => "missing_route_seq",
      Self::AmbiguousUpstreamRouteId => "ambiguous_upstream_route_id",
      Self::MissingUpstreamRouteId => "missing_upstream_route_id",
      Self::MissingPattern => "missing_pattern",
    }
  }
}

/// Rebuild `pattern_headways` from `headway_frequencies` and the TEMP
/// mapping table (full delete + re-insert, idempotent).
pub fn resolve_pattern_headways(
  conn: &Connection,
  routes_fares_source_id: &str,
  create_debug_table: bool,
) -> Result<HeadwayResolveStats> {
  // Pass 1: upstream id → canonical route, with ambiguous ids excluded.
  let mut by_upstream: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
  {
    let mut stmt = conn.prepare(
      "SELECT source_route_id, route_id
       FROM map_route_source
       WHERE source = ?1 AND route_id IS NOT NULL",
    )?;
    let rows = stmt.query_map([routes_fares_source_id], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
      let (raw, route_id) = row?;
      if let Some(upstream) = normalize_upstream_route_id(&raw) {
        by_upstream.entry(upstream).or_default().insert(route_id);
      }
    }
  }
  let ambiguous: BTreeSet<i64> = by_upstream
    .iter()
    .filter(|(_, routes)| routes.len() > 1)
    .map(|(&upstream, _)| upstream)
    .collect();
  let unambiguous: BTreeMap<i64, i64> = by_upstream
    .iter()
    .filter(|(_, routes)| routes.len() == 1)
    .filter_map(|(&upstream, routes)| {
      routes.first().map(|&route_id| (upstream, route_id))
    })
    .collect();

  // Pass 2: best pattern per (route, direction): max stop count, tie-break
  // min pattern_id.
  let mut best_pattern: BTreeMap<(i64, i64), (i64, i64)> = BTreeMap::new();
  {
    let mut stmt = conn.prepare(
      "SELECT rp.route_id, rp.route_seq, rp.pattern_id, COUNT(ps.seq)
       FROM route_patterns rp
       JOIN pattern_stops ps ON ps.pattern_id = rp.pattern_id
       WHERE rp.route_seq IS NOT NULL
       GROUP BY rp.route_id, rp.route_seq, rp.pattern_id",
    )?;
    let rows = stmt.query_map([], |row| {
      Ok((
        row.get::<_, i64>(0)?,
        row.get::<_, i64>(1)?,
        row.get::<_, i64>(2)?,
        row.get::<_, i64>(3)?,
      ))
    })?;
    for row in rows {
      let (route_id, route_seq, pattern_id, stop_count) = row?;
      best_pattern
        .entry((route_id, route_seq))
        .and_modify(|current| {
          let better = stop_count > current.0
            || (stop_count == current.0 && pattern_id < current.1);
          if better {
            *current = (stop_count, pattern_id);
          }
        })
        .or_insert((stop_count, pattern_id));
    }
  }

  // Pass 3: join frequency rows through both maps; aggregate duplicates.
  let mut resolved: BTreeMap<(i64, String, String, String), (i64, Option<String>)> =
    BTreeMap::new();
  let mut stats = HeadwayResolveStats::default();
  let mut debug_rows: Vec<(FrequencyRow, UnresolvedReason)> = Vec::new();

  let frequencies: Vec<FrequencyRow> = {
    let mut stmt = conn.prepare(
      "SELECT upstream_route_id, route_seq, service_id, start_time, end_time,
              headway_secs, sample_trip_id
       FROM headway_frequencies",
    )?;
    let rows = stmt.query_map([], |row| {
      Ok(FrequencyRow {
        upstream_route_id: row.get(0)?,
        route_seq:         row.get(1)?,
        service_id:        row.get(2)?,
        start_time:        row.get(3)?,
        end_time:          row.get(4)?,
        headway_secs:      row.get(5)?,
        sample_trip_id:    row.get(6)?,
      })
    })?;
    rows.collect::<rusqlite::Result<_>>()?
  };

  for freq in frequencies {
    match classify(&freq, &ambiguous, &unambiguous, &best_pattern) {
      Err(reason) => {
        match reason {
          UnresolvedReason::MissingRouteSeq => {
            stats.unresolved_missing_route_seq += 1;
          }
          UnresolvedReason::AmbiguousUpstreamRouteId => {
            stats.unresolved_ambiguous_route += 1;
          }
          UnresolvedReason::MissingUpstreamRouteId => {
            stats.unresolved_missing_route += 1;
          }
          UnresolvedReason::MissingPattern => {
            stats.unresolved_missing_pattern += 1;
          }
        }
        if create_debug_table {
          debug_rows.push((freq, reason));
        }
      }
      Ok(pattern_id) => {
        let key = (
          pattern_id,
          freq.service_id.clone(),
          freq.start_time.clone(),
          freq.end_time.clone(),
        );
        resolved
          .entry(key)
          .and_modify(|(headway, sample)| {
            *headway = (*headway).min(freq.headway_secs);
            *sample = min_sample(sample.take(), freq.sample_trip_id.clone());
          })
          .or_insert((freq.headway_secs, freq.sample_trip_id));
      }
    }
  }

  // Pass 4: replace the derived table wholesale. BTreeMap iteration keeps
  // the insert order byte-identical across runs.
  conn.execute("DELETE FROM pattern_headways", [])?;
  {
    let mut stmt = conn.prepare(
      "INSERT INTO pattern_headways (
         pattern_id, service_id, start_time, end_time, headway_secs, sample_trip_id
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for ((pattern_id, service_id, start_time, end_time), (headway, sample)) in
      &resolved
    {
      stmt.execute(rusqlite::params![
        pattern_id,
        service_id,
        start_time,
        end_time,
        headway,
        sample,
      ])?;
    }
  }
  stats.inserted_rows = resolved.len() as u64;

  if create_debug_table {
    write_debug_table(conn, &debug_rows)?;
  }

  tracing::info!(
    inserted = stats.inserted_rows,
    missing_route = stats.unresolved_missing_route,
    ambiguous_route = stats.unresolved_ambiguous_route,
    missing_route_seq = stats.unresolved_missing_route_seq,
    missing_pattern = stats.unresolved_missing_pattern,
    "headway resolution finished"
  );
  if stats.unresolved_total() > 0 {
    tracing::warn!(
      unresolved = stats.unresolved_total(),
      "headway frequencies left unresolved"
    );
  }

  Ok(stats)
}

/// One reason per unresolved row, in priority order.
fn classify(
  freq: &FrequencyRow,
  ambiguous: &BTreeSet<i64>,
  unambiguous: &BTreeMap<i64, i64>,
  best_pattern: &BTreeMap<(i64, i64), (i64, i64)>,
) -> std::result::Result<i64, UnresolvedReason> {
  let Some(route_seq) = freq.route_seq else {
    return Err(UnresolvedReason::MissingRouteSeq);
  };
  if ambiguous.contains(&freq.upstream_route_id) {
    return Err(UnresolvedReason::AmbiguousUpstreamRouteId);
  }
  let Some(&route_id) = unambiguous.get(&freq.upstream_route_id) else {
    return Err(UnresolvedReason::MissingUpstreamRouteId);
  };
  match best_pattern.get(&(route_id, route_seq)) {
    Some(&(_, pattern_id)) => Ok(pattern_id),
    None => Err(UnresolvedReason::MissingPattern),
  }
}

/// SQL MIN semantics over an optional text column: nulls are ignored.
fn min_sample(a: Option<String>, b: Option<String>) -> Option<String> {
  match (a, b) {
    (Some(a), Some(b)) => Some(a.min(b)),
    (Some(a), None) => Some(a),
    (None, b) => b,
  }
}

fn write_debug_table(
  conn: &Connection,
  rows: &[(FrequencyRow, UnresolvedReason)],
) -> Result<()> {
  conn.execute_batch(
    "DROP TABLE IF EXISTS unresolved_headway_frequencies;
     CREATE TABLE unresolved_headway_frequencies (
       upstream_route_id INTEGER NOT NULL,
       route_seq         INTEGER,
       service_id        TEXT NOT NULL,
       start_time        TEXT NOT NULL,
       end_time          TEXT NOT NULL,
       headway_secs      INTEGER NOT NULL,
       sample_trip_id    TEXT,
       reason            TEXT NOT NULL
     );",
  )?;
  let mut stmt = conn.prepare(
    "INSERT INTO unresolved_headway_frequencies (
       upstream_route_id, route_seq, service_id, start_time, end_time,
       headway_secs, sample_trip_id, reason
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
  )?;
  for (freq, reason) in rows {
    stmt.execute(rusqlite::params![
      freq.upstream_route_id,
      freq.route_seq,
      freq.service_id,
      freq.start_time,
      freq.end_time,
      freq.headway_secs,
      freq.sample_trip_id,
      reason.as_str(),
    ])?;
  }
  Ok(())
}

/// Rows currently in `pattern_headways`.
pub fn pattern_headway_count(conn: &Connection) -> Result<u64> {
  let count: i64 =
    conn.query_row("SELECT COUNT(*) FROM pattern_headways", [], |row| row.get(0))?;
  Ok(count as u64)
}
