//! The bundle committer.
//!
//! The only place canonical tables, the headway resolver and the post-load
//! checks are combined into one transactional, all-or-nothing build. The
//! artifact is assembled at a temporary path and renamed over the final path
//! only after every check passes; on any failure the temporary file is
//! discarded and nothing at the final path is touched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use omnibus_core::fs::{atomic_replace, atomic_write_json, sha256_bytes, sha256_file, utc_now_iso};
use omnibus_core::{Table, Tables, ValidationReport};
use rusqlite::Connection;

use crate::checks::run_integrity_checks;
use crate::config::CommitConfig;
use crate::load::insert_table;
use crate::metadata::{sqlite_version, BuildMetadata, BundleInfo, PragmaSnapshot};
use crate::resolver::{
  create_mapping_table, load_mapping_table, resolve_pattern_headways,
  HeadwayResolveStats,
};
use crate::schema::{CANONICAL_DDL, SCHEMA_VERSION};
use crate::{Error, Result};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Everything one build consumes.
pub struct BuildRequest<'a> {
  pub tables:  &'a Tables,
  /// Source-identity mapping for the headway resolver. Without it every
  /// frequency row counts as missing-route.
  pub mapping: Option<&'a Table>,
  /// Validation report files by source id; hashed into build metadata and
  /// consulted by the gating policy.
  pub validation_reports: &'a BTreeMap<String, PathBuf>,
  pub cfg: &'a CommitConfig,
  pub bundle_id:      &'a str,
  pub bundle_version: &'a str,
  /// `map_route_source.source` value the resolver filters on.
  pub routes_fares_source_id: &'a str,
  pub out_path: &'a Path,
}

/// Merge per-source table sets into one load set. The same table emitted by
/// two sources has no merge policy and aborts when enforcement is on;
/// otherwise the first source wins.
pub fn merge_source_tables(
  sources: Vec<(String, Tables)>,
  enforce_single_source: bool,
) -> Result<Tables> {
  let mut merged = Tables::new();
  let mut owners: BTreeMap<String, String> = BTreeMap::new();
  for (source_id, tables) in sources {
    for (name, table) in tables {
      if let Some(existing) = owners.get(&name) {
        if enforce_single_source {
          return Err(Error::DuplicateTableSource {
            table:    name,
            existing: existing.clone(),
            new:      source_id.clone(),
          });
        }
        tracing::warn!(table = %name, existing = %existing, new = %source_id,
          "duplicate table source, keeping first");
        continue;
      }
      owners.insert(name.clone(), source_id.clone());
      merged.insert(name, table);
    }
  }
  Ok(merged)
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub fn build_bundle(req: &BuildRequest<'_>) -> Result<BuildMetadata> {
  let report_hashes = gate_on_validation(req)?;

  if let Some(parent) = req.out_path.parent() {
    std::fs::create_dir_all(parent).map_err(omnibus_core::Error::from)?;
  }
  let tmp = temp_db_path(req.out_path);

  tracing::info!(
    bundle_id = req.bundle_id,
    bundle_version = req.bundle_version,
    tables = req.tables.len(),
    tmp = %tmp.display(),
    "starting bundle build"
  );

  let built = build_into(&tmp, req, &report_hashes);
  remove_sidecars(&tmp);

  match built {
    Ok(metadata) => {
      atomic_replace(&tmp, req.out_path).map_err(Error::Core)?;
      let sidecar = req.out_path.with_file_name("build_metadata.json");
      atomic_write_json(&sidecar, &metadata).map_err(Error::Core)?;
      tracing::info!(out = %req.out_path.display(), "bundle published");
      Ok(metadata)
    }
    Err(err) => {
      let _ = std::fs::remove_file(&tmp);
      Err(err)
    }
  }
}

/// Consume validation reports: hash each file, and refuse to build when one
/// carries errors (if configured).
fn gate_on_validation(
  req: &BuildRequest<'_>,
) -> Result<BTreeMap<String, String>> {
  let mut hashes = BTreeMap::new();
  for (source_id, path) in req.validation_reports {
    let raw = std::fs::read_to_string(path).map_err(omnibus_core::Error::from)?;
    let report: ValidationReport =
      serde_json::from_str(&raw).map_err(omnibus_core::Error::from)?;
    if req.cfg.require_clean_validation && report.has_errors() {
      return Err(Error::ValidationGate {
        source_id: source_id.clone(),
        errors:    report.summary.errors,
      });
    }
    hashes.insert(source_id.clone(), sha256_file(path).map_err(Error::Core)?);
  }
  Ok(hashes)
}

// ─── Build phases ────────────────────────────────────────────────────────────

fn build_into(
  tmp: &Path,
  req: &BuildRequest<'_>,
  report_hashes: &BTreeMap<String, String>,
) -> Result<BuildMetadata> {
  let total = Instant::now();
  let mut timings: BTreeMap<String, u64> = BTreeMap::new();
  let mut row_counts: BTreeMap<String, u64> = BTreeMap::new();

  let mut conn = Connection::open(tmp)?;
  apply_import_pragmas(&conn, req.cfg)?;

  // DDL first; the loader re-validates every supplied column set against it.
  let phase = Instant::now();
  conn.execute_batch(CANONICAL_DDL)?;
  conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
  timings.insert("ddl_ms".into(), phase.elapsed().as_millis() as u64);

  // One transaction covers every canonical table and the derived headway
  // step; a failure anywhere rolls the whole set back.
  let phase = Instant::now();
  let stats: HeadwayResolveStats;
  {
    let tx = conn.transaction()?;
    for (name, table) in req.tables {
      if name.as_str() == "pattern_headways" {
        // Always derived; never loaded from an input file.
        tracing::warn!("ignoring supplied pattern_headways input (derived table)");
        continue;
      }
      let rows = insert_table(&tx, table, req.cfg.batch_rows)?;
      row_counts.insert(name.clone(), rows as u64);
      tracing::debug!(table = %name, rows, "table loaded");
    }
    timings.insert("load_ms".into(), phase.elapsed().as_millis() as u64);

    let phase = Instant::now();
    match req.mapping {
      Some(mapping) => {
        load_mapping_table(&tx, mapping)?;
      }
      None => create_mapping_table(&tx)?,
    }
    stats = resolve_pattern_headways(
      &tx,
      req.routes_fares_source_id,
      req.cfg.create_headway_debug_table,
    )?;
    timings.insert("headway_resolve_ms".into(), phase.elapsed().as_millis() as u64);

    tx.commit()?;
  }
  row_counts.insert("pattern_headways".into(), stats.inserted_rows);

  let phase = Instant::now();
  populate_meta_row(&conn, req, report_hashes)?;
  timings.insert("meta_ms".into(), phase.elapsed().as_millis() as u64);

  let phase = Instant::now();
  post_load_maintenance(&conn, req.cfg)?;
  timings.insert("maintenance_ms".into(), phase.elapsed().as_millis() as u64);

  // Constraints come back on only now that every table, derived ones
  // included, is present; then the whole store is checked at once.
  let phase = Instant::now();
  apply_final_pragmas(&conn, req.cfg)?;
  run_integrity_checks(&conn)?;
  timings.insert("checks_ms".into(), phase.elapsed().as_millis() as u64);

  timings.insert("total_ms".into(), total.elapsed().as_millis() as u64);

  let metadata = BuildMetadata {
    schema_version: SCHEMA_VERSION,
    sqlite_version: sqlite_version(&conn)?,
    pragmas:        PragmaSnapshot::read(&conn)?,
    commit_config:  req.cfg.clone(),
    bundle:         BundleInfo {
      bundle_id:      req.bundle_id.to_owned(),
      bundle_version: req.bundle_version.to_owned(),
    },
    canonical_ddl_sha256: sha256_bytes(CANONICAL_DDL.as_bytes()),
    validation_reports_sha256: report_hashes.clone(),
    row_counts,
    timings_ms: timings,
    headway_resolution: stats,
    build_utc: utc_now_iso(),
  };

  conn.close().map_err(|(_, err)| Error::Sql(err))?;
  Ok(metadata)
}

fn apply_import_pragmas(conn: &Connection, cfg: &CommitConfig) -> Result<()> {
  conn.pragma_update(None, "journal_mode", cfg.import_journal_mode.as_sql())?;
  conn.pragma_update(None, "synchronous", cfg.import_synchronous.as_sql())?;
  conn.pragma_update(None, "temp_store", "MEMORY")?;
  conn.pragma_update(None, "cache_size", -cfg.cache_size_kb)?;
  conn.busy_timeout(std::time::Duration::from_millis(5000))?;
  // Import first, validate at the end; a table loaded before its parent
  // must not spuriously fail.
  conn.pragma_update(None, "foreign_keys", false)?;
  Ok(())
}

fn apply_final_pragmas(conn: &Connection, cfg: &CommitConfig) -> Result<()> {
  conn.pragma_update(None, "journal_mode", cfg.final_journal_mode.as_sql())?;
  conn.pragma_update(None, "synchronous", cfg.final_synchronous.as_sql())?;
  conn.pragma_update(None, "foreign_keys", true)?;
  Ok(())
}

fn post_load_maintenance(conn: &Connection, cfg: &CommitConfig) -> Result<()> {
  if cfg.run_analyze {
    conn.execute_batch("ANALYZE;")?;
  }
  if cfg.run_optimize {
    conn.execute_batch("PRAGMA optimize;")?;
  }
  if cfg.run_vacuum {
    conn.execute_batch("VACUUM;")?;
  }
  Ok(())
}

fn populate_meta_row(
  conn: &Connection,
  req: &BuildRequest<'_>,
  report_hashes: &BTreeMap<String, String>,
) -> Result<()> {
  let source_versions: BTreeMap<&String, BTreeMap<&str, &str>> = req
    .validation_reports
    .keys()
    .map(|sid| (sid, BTreeMap::from([("version", req.bundle_version)])))
    .collect();
  let notes = serde_json::json!({
    "bundle_id": req.bundle_id,
    "validation_reports_sha256": report_hashes,
  });

  conn.execute(
    "INSERT OR REPLACE INTO meta (
       meta_id, schema_version, bundle_version, generated_at,
       source_versions_json, notes
     ) VALUES (1, ?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      SCHEMA_VERSION,
      req.bundle_version,
      utc_now_iso(),
      serde_json::to_string(&source_versions)
        .map_err(omnibus_core::Error::from)?,
      notes.to_string(),
    ],
  )?;
  Ok(())
}

fn temp_db_path(out_path: &Path) -> PathBuf {
  let stem = out_path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("bundle");
  out_path.with_file_name(format!("{stem}.{}.tmp.sqlite", std::process::id()))
}

fn remove_sidecars(tmp: &Path) {
  for suffix in ["-wal", "-shm"] {
    let mut name = tmp.as_os_str().to_owned();
    name.push(suffix);
    let _ = std::fs::remove_file(PathBuf::from(name));
  }
}
