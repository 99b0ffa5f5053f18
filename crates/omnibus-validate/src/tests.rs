//! Engine tests over small hand-built tables.

use omnibus_core::{IssueCode, Severity, Table, Tables, Value};

use crate::config::ValidateConfig;
use crate::report::Validator;
use crate::spec::{canonical_base, routes_fares};

fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
  let mut t = Table::new(name, columns.iter().copied());
  for row in rows {
    t.push_row(row).expect("row arity");
  }
  t
}

fn tables(list: Vec<Table>) -> Tables {
  list
    .into_iter()
    .map(|t| (t.name().to_owned(), t))
    .collect()
}

fn run(
  tables_in: &Tables,
  unresolved: &Tables,
  mappings: &Tables,
  cfg: ValidateConfig,
) -> omnibus_core::ValidationReport {
  Validator::new(canonical_base(), cfg).run(
    "canonical_base",
    "2026-01-01",
    tables_in,
    unresolved,
    mappings,
  )
}

fn codes(report: &omnibus_core::ValidationReport) -> Vec<IssueCode> {
  report.issues.iter().map(|i| i.code).collect()
}

fn pattern_stops(seqs: &[(i64, i64)]) -> Table {
  table(
    "pattern_stops",
    &["pattern_id", "seq", "place_id"],
    seqs
      .iter()
      .map(|&(pid, seq)| {
        vec![Value::Int(pid), Value::Int(seq), Value::Int(1)]
      })
      .collect(),
  )
}

// ─── Pattern contiguity ──────────────────────────────────────────────────────

#[test]
fn contiguity_gap_is_flagged() {
  let t = tables(vec![pattern_stops(&[(1, 1), (1, 2), (1, 4)])]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  assert!(codes(&report).contains(&IssueCode::PatternSeqGapsOrDupes));
}

#[test]
fn contiguity_duplicate_is_flagged() {
  let t = tables(vec![pattern_stops(&[(1, 1), (1, 1), (1, 2)])]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  assert!(codes(&report).contains(&IssueCode::PatternSeqGapsOrDupes));
}

#[test]
fn contiguous_pattern_passes() {
  let t = tables(vec![pattern_stops(&[(1, 1), (1, 2), (1, 3)])]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  assert!(!codes(&report).contains(&IssueCode::PatternSeqGapsOrDupes));
  assert!(!codes(&report).contains(&IssueCode::PatternSeqBaseMismatch));
}

#[test]
fn seq_base_mismatch_is_flagged() {
  let t = tables(vec![pattern_stops(&[(7, 2), (7, 3)])]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  assert!(codes(&report).contains(&IssueCode::PatternSeqBaseMismatch));
  // 2..3 is internally contiguous; only the base is wrong.
  assert!(!codes(&report).contains(&IssueCode::PatternSeqGapsOrDupes));
}

#[test]
fn contiguity_issue_reports_observed_shape() {
  let t = tables(vec![pattern_stops(&[(1, 1), (1, 2), (1, 4)])]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::PatternSeqGapsOrDupes)
    .expect("gap issue");
  assert_eq!(issue.count, 1);
  let sample = &issue.samples[0];
  assert_eq!(sample.get("min_seq"), Some(&Value::Int(1)));
  assert_eq!(sample.get("max_seq"), Some(&Value::Int(4)));
  assert_eq!(sample.get("distinct_seq"), Some(&Value::Int(3)));
}

// ─── Required tables & early stop ────────────────────────────────────────────

#[test]
fn missing_required_table_is_an_error() {
  let t = tables(vec![pattern_stops(&[(1, 1)])]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let missing: Vec<&str> = report
    .issues
    .iter()
    .filter(|i| i.code == IssueCode::TableMissing)
    .map(|i| i.table.as_str())
    .collect();
  assert!(missing.contains(&"operators"));
  assert!(missing.contains(&"routes"));
  assert!(!missing.contains(&"pattern_stops"));
}

#[test]
fn entirely_absent_core_stops_hard_phase() {
  // Only a fare table, with a NULL key that would otherwise be flagged.
  let t = tables(vec![table(
    "fare_rules",
    &["fare_rule_id", "rule_key"],
    vec![vec![Value::Null, Value::Text("k".into())]],
  )]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  assert!(codes(&report).contains(&IssueCode::TableMissing));
  // Hard phase stopped before schema checks reached fare_rules.
  assert!(!codes(&report).contains(&IssueCode::KeyColumnNull));
}

#[test]
fn partially_present_core_does_not_stop() {
  let t = tables(vec![
    pattern_stops(&[(1, 1)]),
    table(
      "fare_rules",
      &["fare_rule_id", "rule_key"],
      vec![vec![Value::Null, Value::Text("k".into())]],
    ),
  ]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  assert!(codes(&report).contains(&IssueCode::KeyColumnNull));
}

#[test]
fn no_tables_at_all_reports_tables_not_found() {
  let report = run(
    &Tables::new(),
    &Tables::new(),
    &Tables::new(),
    ValidateConfig::default(),
  );
  assert_eq!(codes(&report), vec![IssueCode::TablesNotFound]);
  assert!(report.has_errors());
}

// ─── Schema, nulls, uniqueness ───────────────────────────────────────────────

#[test]
fn column_alias_satisfies_required_columns() {
  // places may carry stop_key in place of place_key.
  let t = tables(vec![table(
    "places",
    &["place_id", "stop_key"],
    vec![vec![Value::Int(1), Value::Text("a".into())]],
  )]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let schema_issues: Vec<_> = report
    .issues
    .iter()
    .filter(|i| i.code == IssueCode::SchemaMissingColumns && i.table == "places")
    .collect();
  assert!(schema_issues.is_empty());
}

#[test]
fn missing_columns_reported_once_per_table() {
  let t = tables(vec![table(
    "routes",
    &["route_id"],
    vec![vec![Value::Int(1)]],
  )]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::SchemaMissingColumns && i.table == "routes")
    .expect("schema issue");
  assert_eq!(issue.count, 2); // route_key, operator_id
  assert!(issue.columns.contains(&"route_key".to_owned()));
  assert!(issue.columns.contains(&"operator_id".to_owned()));
}

#[test]
fn null_key_column_counts_and_samples() {
  let t = tables(vec![table(
    "operators",
    &["operator_id"],
    vec![vec![Value::Null], vec![Value::Int(2)], vec![Value::Null]],
  )]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::KeyColumnNull && i.table == "operators")
    .expect("null issue");
  assert_eq!(issue.count, 2);
  assert_eq!(issue.samples.len(), 2);
}

#[test]
fn duplicate_keys_flag_every_member_of_the_group() {
  let t = tables(vec![table(
    "operators",
    &["operator_id"],
    vec![vec![Value::Int(1)], vec![Value::Int(1)], vec![Value::Int(2)]],
  )]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::UniquenessViolation && i.table == "operators")
    .expect("uniqueness issue");
  assert_eq!(issue.count, 2);
}

#[test]
fn samples_are_bounded_by_sample_size() {
  let rows: Vec<Vec<Value>> = (0..50).map(|_| vec![Value::Null]).collect();
  let t = tables(vec![table("operators", &["operator_id"], rows)]);
  let cfg = ValidateConfig { sample_size: 5, ..ValidateConfig::default() };
  let report = run(&t, &Tables::new(), &Tables::new(), cfg);
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::KeyColumnNull)
    .expect("null issue");
  assert_eq!(issue.count, 50);
  assert_eq!(issue.samples.len(), 5);
}

// ─── Foreign keys & enrichment ───────────────────────────────────────────────

fn fk_fixture() -> Tables {
  tables(vec![
    table("operators", &["operator_id"], vec![vec![Value::Int(1)]]),
    table(
      "routes",
      &["route_id", "route_key", "operator_id"],
      vec![
        vec![Value::Int(10), Value::Text("r10".into()), Value::Int(1)],
        vec![Value::Int(11), Value::Text("r11".into()), Value::Int(9)],
      ],
    ),
  ])
}

#[test]
fn fk_missing_parent_is_flagged() {
  let t = fk_fixture();
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::FkMissing && i.table == "routes")
    .expect("fk issue");
  assert_eq!(issue.count, 1);
  assert_eq!(issue.columns, vec!["operator_id".to_owned()]);
  assert!(issue.source_hint.is_none());
}

#[test]
fn fk_enrichment_changes_samples_but_not_outcome() {
  let t = fk_fixture();
  let mappings = tables(vec![table(
    "map_route_source",
    &["route_id", "source", "source_route_id", "source_file", "source_row"],
    vec![vec![
      Value::Int(11),
      Value::Text("routes_fares".into()),
      Value::Text("011".into()),
      Value::Text("routes.xml".into()),
      Value::Int(42),
    ]],
  )]);

  let bare = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let enriched = run(&t, &Tables::new(), &mappings, ValidateConfig::default());

  let bare_issue = bare
    .issues
    .iter()
    .find(|i| i.code == IssueCode::FkMissing)
    .expect("fk issue");
  let enriched_issue = enriched
    .issues
    .iter()
    .find(|i| i.code == IssueCode::FkMissing)
    .expect("fk issue");

  // Same verdict either way; only the sample detail differs.
  assert_eq!(bare_issue.count, enriched_issue.count);
  assert_eq!(bare_issue.severity, enriched_issue.severity);
  assert!(bare_issue.source_hint.is_none());
  assert_eq!(
    enriched_issue.source_hint.as_deref(),
    Some("enriched via map_route_source on route_id")
  );
  let sample = &enriched_issue.samples[0];
  assert_eq!(
    sample.get("src_source_route_id"),
    Some(&Value::Text("011".into()))
  );
  assert_eq!(sample.get("src_source_row"), Some(&Value::Int(42)));
}

#[test]
fn nullable_fk_ignores_null_child_values() {
  let t = tables(vec![
    table("routes", &["route_id", "route_key", "operator_id"], vec![vec![
      Value::Int(1),
      Value::Text("r1".into()),
      Value::Int(1),
    ]]),
    table("operators", &["operator_id"], vec![vec![Value::Int(1)]]),
    table("route_patterns", &["pattern_id", "pattern_key", "route_id"], vec![
      vec![Value::Int(100), Value::Text("p".into()), Value::Int(1)],
    ]),
    table(
      "fare_rules",
      &["fare_rule_id", "rule_key", "route_id", "pattern_id"],
      vec![vec![
        Value::Int(5),
        Value::Text("k".into()),
        Value::Int(1),
        Value::Null, // nullable FK; must not be counted missing
      ]],
    ),
  ]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let fk_on_fare_rules: Vec<_> = report
    .issues
    .iter()
    .filter(|i| i.code == IssueCode::FkMissing && i.table == "fare_rules")
    .collect();
  assert!(fk_on_fare_rules.is_empty());
}

// ─── Unresolved gating ───────────────────────────────────────────────────────

#[test]
fn fare_orphans_tolerated_by_default() {
  let unresolved = tables(vec![table(
    "fare_orphans",
    &["mode", "route_id_norm"],
    vec![vec![Value::Text("bus".into()), Value::Int(3)]],
  )]);
  let report = Validator::new(routes_fares(), ValidateConfig::default()).run(
    "routes_fares",
    "2026-01-01",
    &tables(vec![pattern_stops(&[(1, 1)])]),
    &unresolved,
    &Tables::new(),
  );
  assert!(!codes(&report).contains(&IssueCode::UnresolvedNonempty));
}

#[test]
fn fare_orphans_gate_when_not_allowed() {
  let unresolved = tables(vec![table(
    "fare_orphans",
    &["mode", "route_id_norm"],
    vec![vec![Value::Text("bus".into()), Value::Int(3)]],
  )]);
  let cfg = ValidateConfig {
    allow_unresolved_fares: false,
    ..ValidateConfig::default()
  };
  let report = Validator::new(routes_fares(), cfg).run(
    "routes_fares",
    "2026-01-01",
    &tables(vec![pattern_stops(&[(1, 1)])]),
    &unresolved,
    &Tables::new(),
  );
  let issue = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::UnresolvedNonempty)
    .expect("gating issue");
  assert_eq!(issue.table, "unresolved/fare_orphans");
  assert_eq!(issue.count, 1);
}

// ─── Soft phase & exit policy ────────────────────────────────────────────────

#[test]
fn short_pattern_warns_but_does_not_error() {
  let t = tables(vec![pattern_stops(&[(1, 1)])]);
  let cfg = ValidateConfig {
    // Keep the run otherwise clean so only the soft warning remains.
    hard_stop_on_missing_core: false,
    ..ValidateConfig::default()
  };
  let report = Validator::new(
    {
      let mut s = canonical_base();
      s.required_tables.clear();
      s
    },
    cfg,
  )
  .run("canonical_base", "v", &t, &Tables::new(), &Tables::new());

  let warn = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::PatternTooShort)
    .expect("short-pattern warning");
  assert_eq!(warn.severity, Severity::Warn);
  assert_eq!(report.summary.errors, 0);
  assert!(report.failed(true));
  assert!(!report.failed(false));
}

#[test]
fn routes_without_fares_warn() {
  let t = tables(vec![
    table("routes", &["route_id", "route_key", "operator_id"], vec![
      vec![Value::Int(1), Value::Text("r1".into()), Value::Int(1)],
      vec![Value::Int(2), Value::Text("r2".into()), Value::Int(1)],
    ]),
    table("operators", &["operator_id"], vec![vec![Value::Int(1)]]),
    table(
      "fare_rules",
      &["fare_rule_id", "rule_key", "route_id"],
      vec![vec![Value::Int(1), Value::Text("k".into()), Value::Int(1)]],
    ),
  ]);
  let report = run(&t, &Tables::new(), &Tables::new(), ValidateConfig::default());
  let warn = report
    .issues
    .iter()
    .find(|i| i.code == IssueCode::RouteMissingFares)
    .expect("fare warning");
  assert_eq!(warn.count, 1);
  assert_eq!(warn.samples[0].get("route_id"), Some(&Value::Int(2)));
}
