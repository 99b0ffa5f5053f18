//! Declarative validation rule engine.
//!
//! Evaluates a [`ValidationSpec`] against in-memory tables and produces a
//! flat list of issues. The engine never raises on expected data problems —
//! it reports; callers decide fatality. It is read-only and side-effect-free
//! over its inputs.

pub mod checks;
pub mod config;
pub mod report;
pub mod spec;

pub use config::ValidateConfig;
pub use report::{Validator, write_report, REPORT_VERSION};
pub use spec::{
  canonical_base, headway, routes_fares, spec_for_source, ColumnRef,
  ForeignKeyRule, MappingRule, TableRule, UniquenessRule, UnresolvedRule,
  ValidationSpec,
};

#[cfg(test)]
mod tests;
