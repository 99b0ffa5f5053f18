//! Error type for `omnibus-commit`.
//!
//! Every variant here aborts a build. Each carries enough detail — table
//! name, expected vs. actual columns, or a bounded row preview — to locate
//! the bad source record without re-running the build.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] omnibus_core::Error),

  #[error("database error: {0}")]
  Sql(#[from] rusqlite::Error),

  #[error("table '{table}' does not exist in the schema (did the DDL run?)")]
  TableMissingFromSchema { table: String },

  #[error(
    "column mismatch for table '{table}': missing {missing:?}, extra \
     {extra:?} (expected {expected:?}, actual {actual:?})"
  )]
  ColumnMismatch {
    table:    String,
    missing:  Vec<String>,
    extra:    Vec<String>,
    expected: Vec<String>,
    actual:   Vec<String>,
  },

  #[error(
    "table '{table}' emitted by both '{existing}' and '{new}' (merge policy \
     not implemented)"
  )]
  DuplicateTableSource {
    table:    String,
    existing: String,
    new:      String,
  },

  #[error(
    "validation report for '{source_id}' has {errors} error(s); refusing to \
     commit"
  )]
  ValidationGate { source_id: String, errors: u64 },

  #[error("sqlite integrity_check failed: {detail}")]
  IntegrityCheckFailed { detail: String },

  #[error("sqlite foreign_key_check failed ({count} rows). preview:\n{preview}")]
  ForeignKeyCheckFailed { count: u64, preview: String },

  #[error(
    "pattern_stops seq contiguity failed for {count} pattern(s) (expected \
     min(seq)=1 and max(seq)=count(*)). preview:\n{preview}"
  )]
  ContiguityCheckFailed { count: u64, preview: String },

  #[error("app bundle must not contain canonical fare tables: found {tables:?}")]
  AppViewContainsRawFares { tables: Vec<String> },

  #[error("missing input: {0}")]
  MissingInput(PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
