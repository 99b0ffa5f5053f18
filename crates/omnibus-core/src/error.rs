//! Error types for `omnibus-core`.
//!
//! Data-quality findings are never errors — they are accumulated
//! [`ValidationIssue`](crate::ValidationIssue)s. This enum covers the
//! unrecoverable conditions: malformed in-memory tables, bad companion
//! metadata, and IO/serialization failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(
    "row {row} of table '{table}' has {got} cells, expected {expected}"
  )]
  RowArity {
    table:    String,
    row:      usize,
    got:      usize,
    expected: usize,
  },

  #[error("table metadata mismatch for '{table}': {detail}")]
  TableMetaMismatch { table: String, detail: String },

  #[error("missing input: {0}")]
  MissingInput(PathBuf),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
