//! Companion metadata for canonical table inputs.
//!
//! Upstream stages emit one metadata record per table file: row count,
//! content hash, schema hash. The committer trusts these only after
//! re-validating the actual column set against its own expected schema.

use serde::{Deserialize, Serialize};

use crate::fs::sha256_bytes;
use crate::{Error, Result, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
  pub table:          String,
  pub row_count:      u64,
  pub content_sha256: String,
  pub schema_sha256:  String,
}

/// Fingerprint of a column set: order-sensitive, name-only.
pub fn schema_fingerprint(columns: &[String]) -> String {
  sha256_bytes(columns.join("\u{1f}").as_bytes())
}

impl TableMeta {
  /// Check a loaded table against its companion record. The content hash is
  /// over the raw input file and is verified by the loader; here we confirm
  /// row count and schema fingerprint.
  pub fn verify(&self, table: &Table) -> Result<()> {
    if self.row_count != table.len() as u64 {
      return Err(Error::TableMetaMismatch {
        table:  table.name().to_owned(),
        detail: format!(
          "row count {} declared, {} loaded",
          self.row_count,
          table.len()
        ),
      });
    }
    let actual = schema_fingerprint(table.columns());
    if self.schema_sha256 != actual {
      return Err(Error::TableMetaMismatch {
        table:  table.name().to_owned(),
        detail: format!(
          "schema hash {} declared, {} loaded",
          self.schema_sha256, actual
        ),
      });
    }
    Ok(())
  }
}
