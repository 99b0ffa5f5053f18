//! Validation specs — the declarative rule sets the engine evaluates.
//!
//! A spec is an explicitly constructed value, passed into the engine by the
//! caller. There is no process-wide registry cache; `spec_for_source` builds
//! a fresh spec on every call.

use std::collections::{BTreeMap, BTreeSet};

use omnibus_core::{Severity, Table};

// ─── Column references ───────────────────────────────────────────────────────

/// One canonical column name or a list of acceptable aliases; the first
/// name present in the table wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
  names: Vec<String>,
}

impl ColumnRef {
  pub fn new(name: &str) -> Self {
    Self { names: vec![name.to_owned()] }
  }

  pub fn aliased(names: &[&str]) -> Self {
    Self { names: names.iter().map(|n| (*n).to_owned()).collect() }
  }

  /// The column this reference resolves to in `table`, if any.
  pub fn resolve<'t>(&self, table: &'t Table) -> Option<&'t str> {
    self.names.iter().find_map(|n| {
      table
        .columns()
        .iter()
        .find(|c| *c == n)
        .map(String::as_str)
    })
  }

  /// Render for messages: `place_key` or `place_key|stop_key`.
  pub fn display(&self) -> String {
    self.names.join("|")
  }
}

impl From<&str> for ColumnRef {
  fn from(name: &str) -> Self { Self::new(name) }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UniquenessRule {
  pub columns:  Vec<ColumnRef>,
  pub severity: Severity,
  pub message:  Option<String>,
}

impl UniquenessRule {
  pub fn on(columns: &[&str]) -> Self {
    Self {
      columns:  columns.iter().map(|c| ColumnRef::new(c)).collect(),
      severity: Severity::Error,
      message:  None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct ForeignKeyRule {
  pub child_table:  String,
  pub child_col:    ColumnRef,
  pub parent_table: String,
  pub parent_col:   ColumnRef,
  pub severity:     Severity,
  pub message:      Option<String>,
  /// Nullable FKs only check non-null child values by default.
  pub only_check_non_null: bool,
  /// Child columns used to join sample rows against declared mapping
  /// tables for enrichment.
  pub hint_join_keys: Vec<String>,
}

impl ForeignKeyRule {
  pub fn new(
    child_table: &str,
    child_col: &str,
    parent_table: &str,
    parent_col: &str,
  ) -> Self {
    Self {
      child_table:  child_table.to_owned(),
      child_col:    ColumnRef::new(child_col),
      parent_table: parent_table.to_owned(),
      parent_col:   ColumnRef::new(parent_col),
      severity:     Severity::Error,
      message:      None,
      only_check_non_null: true,
      hint_join_keys: Vec::new(),
    }
  }

  pub fn hints(mut self, keys: &[&str]) -> Self {
    self.hint_join_keys = keys.iter().map(|k| (*k).to_owned()).collect();
    self
  }

  pub fn warn(mut self) -> Self {
    self.severity = Severity::Warn;
    self
  }
}

#[derive(Debug, Clone, Default)]
pub struct TableRule {
  pub required_columns: Vec<ColumnRef>,
  pub not_null_columns: Vec<ColumnRef>,
  /// Default sort applied to sample rows from this table.
  pub sample_sort: Vec<String>,
  pub uniqueness:  Vec<UniquenessRule>,
}

#[derive(Debug, Clone)]
pub struct UnresolvedRule {
  pub fail_if_nonempty: bool,
  pub sample_sort:      Vec<String>,
}

/// A declared source-identity mapping table usable for FK sample
/// enrichment: rows keyed by `key_column` carry the configured upstream
/// hint columns.
#[derive(Debug, Clone)]
pub struct MappingRule {
  pub key_column:   String,
  /// Acceptable mapping table names, first present wins.
  pub tables:       Vec<String>,
  pub hint_columns: Vec<String>,
}

// ─── Spec ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ValidationSpec {
  pub spec_id:      String,
  pub spec_version: String,
  /// Tables whose total absence stops the hard phase early.
  pub core_tables:     BTreeSet<String>,
  pub required_tables: BTreeSet<String>,
  pub tables:          BTreeMap<String, TableRule>,
  pub foreign_keys:    Vec<ForeignKeyRule>,
  pub unresolved:      BTreeMap<String, UnresolvedRule>,
  pub mappings:        Vec<MappingRule>,
}

impl ValidationSpec {
  pub fn rules_version(&self) -> String {
    format!("{}@{}", self.spec_id, self.spec_version)
  }
}

fn names(list: &[&str]) -> BTreeSet<String> {
  list.iter().map(|s| (*s).to_owned()).collect()
}

fn cols(list: &[&str]) -> Vec<ColumnRef> {
  list.iter().map(|c| ColumnRef::new(c)).collect()
}

fn sort(list: &[&str]) -> Vec<String> {
  list.iter().map(|s| (*s).to_owned()).collect()
}

// ─── Built-in specs ──────────────────────────────────────────────────────────

/// Rules shared by every canonical source: the five core tables plus the
/// fare tables (whose column/uniqueness checks always apply, though only the
/// fares source *requires* them to exist).
pub fn canonical_base() -> ValidationSpec {
  let mut tables = BTreeMap::new();

  tables.insert("operators".to_owned(), TableRule {
    required_columns: cols(&["operator_id"]),
    not_null_columns: cols(&["operator_id"]),
    sample_sort:      sort(&["operator_id"]),
    uniqueness:       vec![UniquenessRule::on(&["operator_id"])],
  });

  tables.insert("places".to_owned(), TableRule {
    required_columns: vec![
      ColumnRef::new("place_id"),
      ColumnRef::aliased(&["place_key", "stop_key"]),
    ],
    not_null_columns: vec![
      ColumnRef::new("place_id"),
      ColumnRef::aliased(&["place_key", "stop_key"]),
    ],
    sample_sort: sort(&["place_id"]),
    uniqueness:  vec![
      UniquenessRule::on(&["place_id"]),
      UniquenessRule {
        columns:  vec![ColumnRef::aliased(&["place_key", "stop_key"])],
        severity: Severity::Error,
        message:  None,
      },
    ],
  });

  tables.insert("routes".to_owned(), TableRule {
    required_columns: cols(&["route_id", "route_key", "operator_id"]),
    not_null_columns: cols(&["route_id", "route_key", "operator_id"]),
    sample_sort:      sort(&["route_id"]),
    uniqueness:       vec![
      UniquenessRule::on(&["route_id"]),
      UniquenessRule::on(&["route_key"]),
    ],
  });

  tables.insert("route_patterns".to_owned(), TableRule {
    required_columns: cols(&["pattern_id", "pattern_key", "route_id"]),
    not_null_columns: cols(&["pattern_id", "route_id"]),
    sample_sort:      sort(&["pattern_id"]),
    uniqueness:       vec![
      UniquenessRule::on(&["pattern_id"]),
      UniquenessRule::on(&["pattern_key"]),
    ],
  });

  tables.insert("pattern_stops".to_owned(), TableRule {
    required_columns: cols(&["pattern_id", "seq", "place_id"]),
    not_null_columns: cols(&["pattern_id", "seq", "place_id"]),
    sample_sort:      sort(&["pattern_id", "seq"]),
    uniqueness:       vec![UniquenessRule::on(&["pattern_id", "seq"])],
  });

  tables.insert("fare_products".to_owned(), TableRule {
    required_columns: cols(&["fare_product_id"]),
    not_null_columns: cols(&["fare_product_id"]),
    sample_sort:      sort(&["fare_product_id"]),
    uniqueness:       vec![UniquenessRule::on(&["fare_product_id"])],
  });

  tables.insert("fare_rules".to_owned(), TableRule {
    required_columns: cols(&["fare_rule_id"]),
    not_null_columns: cols(&["fare_rule_id"]),
    sample_sort:      sort(&["fare_rule_id"]),
    uniqueness:       vec![
      UniquenessRule::on(&["fare_rule_id"]),
      UniquenessRule::on(&["rule_key"]),
    ],
  });

  tables.insert("fare_amounts".to_owned(), TableRule {
    required_columns: cols(&["fare_rule_id"]),
    not_null_columns: cols(&["fare_rule_id"]),
    sample_sort:      sort(&["fare_rule_id"]),
    uniqueness:       vec![UniquenessRule::on(&[
      "fare_rule_id",
      "fare_product_id",
    ])],
  });

  let foreign_keys = vec![
    ForeignKeyRule::new("routes", "operator_id", "operators", "operator_id")
      .hints(&["route_id"]),
    ForeignKeyRule::new("route_patterns", "route_id", "routes", "route_id")
      .hints(&["pattern_id", "route_id"]),
    ForeignKeyRule::new(
      "pattern_stops",
      "pattern_id",
      "route_patterns",
      "pattern_id",
    )
    .hints(&["pattern_id"]),
    ForeignKeyRule::new("pattern_stops", "place_id", "places", "place_id")
      .hints(&["pattern_id", "place_id"]),
    ForeignKeyRule::new("fare_amounts", "fare_rule_id", "fare_rules", "fare_rule_id")
      .hints(&["fare_rule_id"]),
    ForeignKeyRule::new(
      "fare_amounts",
      "fare_product_id",
      "fare_products",
      "fare_product_id",
    )
    .hints(&["fare_rule_id", "fare_product_id"]),
    ForeignKeyRule::new("fare_rules", "route_id", "routes", "route_id")
      .hints(&["fare_rule_id", "route_id"]),
    ForeignKeyRule::new("fare_rules", "pattern_id", "route_patterns", "pattern_id")
      .hints(&["fare_rule_id", "pattern_id"]),
  ];

  let mappings = vec![
    MappingRule {
      key_column:   "route_id".to_owned(),
      tables:       sort(&["map_route_source", "map_routes_source"]),
      hint_columns: sort(&["source", "source_route_id", "source_file", "source_row"]),
    },
    MappingRule {
      key_column:   "place_id".to_owned(),
      tables:       sort(&["map_place_source", "map_places_source"]),
      hint_columns: sort(&["source", "source_place_id", "source_file", "source_row"]),
    },
    MappingRule {
      key_column:   "pattern_id".to_owned(),
      tables:       sort(&["map_pattern_source", "map_patterns_source"]),
      hint_columns: sort(&["source", "source_pattern_id", "source_file", "source_row"]),
    },
  ];

  let core =
    names(&["operators", "places", "routes", "route_patterns", "pattern_stops"]);

  ValidationSpec {
    spec_id:      "canonical_base".to_owned(),
    spec_version: "1.0".to_owned(),
    core_tables:  core.clone(),
    required_tables: core,
    tables,
    foreign_keys,
    unresolved: BTreeMap::new(),
    mappings,
  }
}

/// The routes/fares source additionally requires the fare tables and gates
/// on the `fare_orphans` side-table (tolerated by configuration).
pub fn routes_fares() -> ValidationSpec {
  let mut spec = canonical_base();
  spec.spec_id = "routes_fares".to_owned();
  spec
    .required_tables
    .extend(names(&["fare_products", "fare_rules", "fare_amounts"]));
  spec.unresolved.insert("fare_orphans".to_owned(), UnresolvedRule {
    fail_if_nonempty: true,
    sample_sort: sort(&["mode", "route_id_norm", "source_file", "source_row"]),
  });
  spec
}

/// The GTFS headway source: calendars, trips and frequency bands keyed by
/// upstream identifiers.
pub fn headway() -> ValidationSpec {
  let mut tables = BTreeMap::new();

  tables.insert("service_calendars".to_owned(), TableRule {
    required_columns: cols(&["service_id"]),
    not_null_columns: cols(&["service_id"]),
    sample_sort:      sort(&["service_id"]),
    uniqueness:       vec![UniquenessRule::on(&["service_id"])],
  });

  tables.insert("headway_trips".to_owned(), TableRule {
    required_columns: cols(&["trip_id", "upstream_route_id", "service_id"]),
    not_null_columns: cols(&["trip_id", "upstream_route_id", "service_id"]),
    sample_sort:      sort(&["upstream_route_id", "service_id", "trip_id"]),
    uniqueness:       vec![UniquenessRule::on(&["trip_id"])],
  });

  tables.insert("headway_frequencies".to_owned(), TableRule {
    required_columns: cols(&[
      "upstream_route_id",
      "service_id",
      "start_time",
      "end_time",
      "headway_secs",
    ]),
    not_null_columns: cols(&[
      "upstream_route_id",
      "service_id",
      "start_time",
      "end_time",
      "headway_secs",
    ]),
    sample_sort: sort(&["upstream_route_id", "service_id", "start_time", "end_time"]),
    uniqueness:  vec![UniquenessRule::on(&[
      "upstream_route_id",
      "route_seq",
      "service_id",
      "start_time",
      "end_time",
    ])],
  });

  let foreign_keys = vec![
    ForeignKeyRule::new(
      "headway_trips",
      "service_id",
      "service_calendars",
      "service_id",
    )
    .hints(&["trip_id", "service_id"]),
    ForeignKeyRule::new(
      "headway_frequencies",
      "service_id",
      "service_calendars",
      "service_id",
    )
    .hints(&["upstream_route_id", "service_id"]),
    ForeignKeyRule::new(
      "headway_frequencies",
      "sample_trip_id",
      "headway_trips",
      "trip_id",
    )
    .warn()
    .hints(&["upstream_route_id", "service_id"]),
  ];

  let core = names(&["service_calendars", "headway_trips", "headway_frequencies"]);

  ValidationSpec {
    spec_id:      "headway".to_owned(),
    spec_version: "1.0".to_owned(),
    core_tables:  core.clone(),
    required_tables: core,
    tables,
    foreign_keys,
    unresolved: BTreeMap::new(),
    mappings:   Vec::new(),
  }
}

/// Spec registry: `None` for sources with no registered rule set.
pub fn spec_for_source(source_id: &str) -> Option<ValidationSpec> {
  match source_id {
    "routes_fares" => Some(routes_fares()),
    "headway" => Some(headway()),
    "canonical_base" => Some(canonical_base()),
    _ => None,
  }
}
