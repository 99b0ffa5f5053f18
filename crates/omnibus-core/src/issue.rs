//! Validation issues and reports.
//!
//! Issues are plain values: the validation engine accumulates them and lets
//! the caller decide fatality. They never mutate tables and are opaque to
//! everything downstream except the pass/fail gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Value;

// ─── Severity & codes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
  Error,
  Warn,
}

/// The closed set of issue codes. Adding a code is a deliberate schema
/// change for report consumers, not a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
  TableMissing,
  TablesNotFound,
  SchemaMissingColumns,
  KeyColumnNull,
  UniquenessViolation,
  FkMissing,
  PatternSeqBaseMismatch,
  PatternSeqGapsOrDupes,
  PatternTooShort,
  PatternTooLong,
  RouteMissingFares,
  UnresolvedNonempty,
}

impl IssueCode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::TableMissing => "TABLE_MISSING",
      Self::TablesNotFound => "TABLES_NOT_FOUND",
      Self::SchemaMissingColumns => "SCHEMA_MISSING_COLUMNS",
      Self::KeyColumnNull => "KEY_COLUMN_NULL",
      Self::UniquenessViolation => "UNIQUENESS_VIOLATION",
      Self::FkMissing => "FK_MISSING",
      Self::PatternSeqBaseMismatch => "PATTERN_SEQ_BASE_MISMATCH",
      Self::PatternSeqGapsOrDupes => "PATTERN_SEQ_GAPS_OR_DUPES",
      Self::PatternTooShort => "PATTERN_TOO_SHORT",
      Self::PatternTooLong => "PATTERN_TOO_LONG",
      Self::RouteMissingFares => "ROUTE_MISSING_FARES",
      Self::UnresolvedNonempty => "UNRESOLVED_NONEMPTY",
    }
  }
}

// ─── Issue ───────────────────────────────────────────────────────────────────

/// A bounded sample row: column name → cell value, deterministically keyed.
pub type SampleRow = BTreeMap<String, Value>;

/// One finding from the validation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
  pub severity: Severity,
  pub code:     IssueCode,
  /// The offending table (or `unresolved/<name>` for side-tables).
  pub table:    String,
  pub message:  String,
  /// Affected-row count, not sample count.
  pub count:    u64,
  pub columns:  Vec<String>,
  /// Bounded, deterministically-sorted sample of offending rows.
  pub samples:  Vec<SampleRow>,
  /// Where enriched FK samples came from, when mappings were available.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_hint: Option<String>,
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
  pub errors:             u64,
  pub warnings:           u64,
  pub tables_checked:     u64,
  pub unresolved_checked: u64,
  pub mappings_checked:   u64,
}

/// The JSON artifact consumed by the downstream publish step (and by the
/// committer's gating). `config` is whatever configuration the engine ran
/// with, embedded verbatim for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
  pub report_version:   String,
  pub source_id:        String,
  pub version:          String,
  pub rules_version:    String,
  pub generated_at_utc: String,
  pub summary:          ValidationSummary,
  pub issues:           Vec<ValidationIssue>,
  pub config:           serde_json::Value,
}

impl ValidationReport {
  pub fn has_errors(&self) -> bool { self.summary.errors > 0 }

  /// Exit policy: fail on any error, or on any warning when `fail_on_warn`
  /// is configured.
  pub fn failed(&self, fail_on_warn: bool) -> bool {
    self.summary.errors > 0 || (fail_on_warn && self.summary.warnings > 0)
  }
}
