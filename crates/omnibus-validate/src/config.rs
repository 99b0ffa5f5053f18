//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Knobs for a validation run. Embedded verbatim into the report so a
/// consumer can tell which policy produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
  /// Treat warnings as fatal in the exit policy.
  pub fail_on_warn: bool,
  /// Upper bound on sample rows attached to any single issue.
  pub sample_size: usize,

  /// Stop the hard phase after the required-tables check when the whole
  /// core table set is absent.
  pub hard_stop_on_missing_core: bool,

  /// Expected first `seq` per pattern.
  pub seq_base: i64,
  pub require_contiguous_seq: bool,

  /// Pattern-shape warnings (soft phase).
  pub min_pattern_stops_warn: usize,
  pub max_pattern_stops_warn: usize,

  /// Tolerate a non-empty `fare_orphans` unresolved side-table.
  pub allow_unresolved_fares: bool,
}

impl Default for ValidateConfig {
  fn default() -> Self {
    Self {
      fail_on_warn: true,
      sample_size: 100,
      hard_stop_on_missing_core: true,
      seq_base: 1,
      require_contiguous_seq: true,
      min_pattern_stops_warn: 2,
      max_pattern_stops_warn: 200,
      allow_unresolved_fares: true,
    }
  }
}
