//! Running the engine and producing the JSON report.

use std::path::Path;

use omnibus_core::fs::{atomic_write_json, utc_now_iso};
use omnibus_core::{
  IssueCode, Result, Severity, Tables, ValidationIssue, ValidationReport,
  ValidationSummary,
};

use crate::checks::{hard_validate, soft_validate, CheckContext};
use crate::config::ValidateConfig;
use crate::spec::ValidationSpec;

pub const REPORT_VERSION: &str = "1.0";

/// An explicitly constructed validator: a spec plus its configuration.
/// Callers build one per run and pass it around; nothing is cached
/// process-wide.
#[derive(Debug, Clone)]
pub struct Validator {
  spec: ValidationSpec,
  cfg:  ValidateConfig,
}

impl Validator {
  pub fn new(spec: ValidationSpec, cfg: ValidateConfig) -> Self {
    Self { spec, cfg }
  }

  pub fn config(&self) -> &ValidateConfig { &self.cfg }

  /// Evaluate both phases and assemble the report. Never errors on data
  /// problems; everything expected lands in `issues`.
  pub fn run(
    &self,
    source_id: &str,
    version: &str,
    tables: &Tables,
    unresolved: &Tables,
    mappings: &Tables,
  ) -> ValidationReport {
    let issues = if tables.is_empty() {
      vec![ValidationIssue {
        severity: Severity::Error,
        code:     IssueCode::TablesNotFound,
        table:    "(engine)".to_owned(),
        message:  format!("no canonical tables supplied for '{source_id}'"),
        count:    1,
        columns:  Vec::new(),
        samples:  Vec::new(),
        source_hint: None,
      }]
    } else {
      let ctx = CheckContext {
        spec: &self.spec,
        tables,
        unresolved,
        mappings,
        cfg: &self.cfg,
      };
      let mut issues = hard_validate(&ctx);
      issues.extend(soft_validate(tables, &self.cfg));
      issues
    };

    let errors =
      issues.iter().filter(|i| i.severity == Severity::Error).count() as u64;
    let warnings =
      issues.iter().filter(|i| i.severity == Severity::Warn).count() as u64;

    tracing::info!(
      source_id,
      version,
      errors,
      warnings,
      tables = tables.len(),
      "validation finished"
    );

    ValidationReport {
      report_version:   REPORT_VERSION.to_owned(),
      source_id:        source_id.to_owned(),
      version:          version.to_owned(),
      rules_version:    self.spec.rules_version(),
      generated_at_utc: utc_now_iso(),
      summary:          ValidationSummary {
        errors,
        warnings,
        tables_checked: tables.len() as u64,
        unresolved_checked: unresolved.len() as u64,
        mappings_checked: mappings.len() as u64,
      },
      issues,
      config: serde_json::to_value(&self.cfg).unwrap_or_default(),
    }
  }
}

/// Write a report atomically; a downstream consumer never sees a partial
/// file.
pub fn write_report(path: &Path, report: &ValidationReport) -> Result<()> {
  atomic_write_json(path, report)
}
