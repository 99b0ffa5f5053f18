//! Build metadata — the JSON sidecar written next to every artifact.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::CommitConfig;
use crate::resolver::HeadwayResolveStats;
use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct PragmaSnapshot {
  pub journal_mode: String,
  pub synchronous:  i64,
  pub foreign_keys: i64,
  pub cache_size:   i64,
  pub user_version: i64,
}

impl PragmaSnapshot {
  pub fn read(conn: &Connection) -> Result<Self> {
    let get_i64 = |pragma: &str| -> Result<i64> {
      Ok(conn.query_row(&format!("PRAGMA {pragma}"), [], |row| row.get(0))?)
    };
    Ok(Self {
      journal_mode: conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))?,
      synchronous:  get_i64("synchronous")?,
      foreign_keys: get_i64("foreign_keys")?,
      cache_size:   get_i64("cache_size")?,
      user_version: get_i64("user_version")?,
    })
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleInfo {
  pub bundle_id:      String,
  pub bundle_version: String,
}

/// Everything a human (or the publish step) needs to account for a build:
/// what went in, what came out, and how long each phase took.
#[derive(Debug, Clone, Serialize)]
pub struct BuildMetadata {
  pub schema_version: i64,
  pub sqlite_version: String,
  pub pragmas:        PragmaSnapshot,
  pub commit_config:  CommitConfig,
  pub bundle:         BundleInfo,
  pub canonical_ddl_sha256: String,
  pub validation_reports_sha256: BTreeMap<String, String>,
  pub row_counts: BTreeMap<String, u64>,
  pub timings_ms: BTreeMap<String, u64>,
  pub headway_resolution: HeadwayResolveStats,
  pub build_utc: String,
}

pub fn sqlite_version(conn: &Connection) -> Result<String> {
  Ok(conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?)
}
