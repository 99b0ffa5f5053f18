//! Committer configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
  Delete,
  Truncate,
  Persist,
  Memory,
  Wal,
  Off,
}

impl JournalMode {
  pub fn as_sql(self) -> &'static str {
    match self {
      Self::Delete => "DELETE",
      Self::Truncate => "TRUNCATE",
      Self::Persist => "PERSIST",
      Self::Memory => "MEMORY",
      Self::Wal => "WAL",
      Self::Off => "OFF",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncMode {
  Off,
  Normal,
  Full,
  Extra,
}

impl SyncMode {
  pub fn as_sql(self) -> &'static str {
    match self {
      Self::Off => "OFF",
      Self::Normal => "NORMAL",
      Self::Full => "FULL",
      Self::Extra => "EXTRA",
    }
  }
}

/// Build knobs. The import settings are write-optimized (deferred
/// durability, large cache, constraints off); the final settings harden the
/// immutable artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
  pub cache_size_kb: i64,
  /// Progress-report granularity during bulk loads.
  pub batch_rows: usize,
  pub import_journal_mode: JournalMode,
  pub import_synchronous:  SyncMode,
  pub final_journal_mode:  JournalMode,
  pub final_synchronous:   SyncMode,
  pub run_analyze:  bool,
  pub run_optimize: bool,
  pub run_vacuum:   bool,
  /// Abort if two sources supply the same table (no merge policy).
  pub enforce_single_source_per_table: bool,
  /// Materialize `unresolved_headway_frequencies` with per-row reasons.
  pub create_headway_debug_table: bool,
  /// Refuse to build when a consumed validation report has errors.
  pub require_clean_validation: bool,
}

impl Default for CommitConfig {
  fn default() -> Self {
    Self {
      cache_size_kb: 200_000,
      batch_rows: 50_000,
      import_journal_mode: JournalMode::Wal,
      import_synchronous:  SyncMode::Normal,
      final_journal_mode:  JournalMode::Delete,
      final_synchronous:   SyncMode::Full,
      run_analyze:  true,
      run_optimize: true,
      run_vacuum:   true,
      enforce_single_source_per_table: true,
      create_headway_debug_table: true,
      require_clean_validation: true,
    }
  }
}
