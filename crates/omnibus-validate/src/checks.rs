//! The hard and soft check phases.
//!
//! Hard checks run in a fixed order and gate publication; the only early
//! exit is a completely absent core table set (no point checking foreign
//! keys against tables that are not there). Soft checks are advisory shape
//! warnings and never stop anything.

use std::collections::{BTreeMap, BTreeSet};

use omnibus_core::{
  issue::SampleRow, IssueCode, Severity, Table, Tables, ValidationIssue, Value,
};

use crate::config::ValidateConfig;
use crate::spec::{ForeignKeyRule, MappingRule, ValidationSpec};

// ─── Context ─────────────────────────────────────────────────────────────────

pub struct CheckContext<'a> {
  pub spec:       &'a ValidationSpec,
  pub tables:     &'a Tables,
  pub unresolved: &'a Tables,
  pub mappings:   &'a Tables,
  pub cfg:        &'a ValidateConfig,
}

struct HardState {
  stop: bool,
}

// ─── Sample helpers ──────────────────────────────────────────────────────────

/// Project `rows` of `table` onto `columns`, sorted by `sort_columns`,
/// bounded at `n`. Samples are never unsampled; tables can be large.
fn take_samples(
  table: &Table,
  rows: &[usize],
  columns: &[&str],
  sort_columns: &[&str],
  n: usize,
) -> Vec<SampleRow> {
  let mut order: Vec<usize> = rows.to_vec();
  let sort_idx: Vec<usize> = sort_columns
    .iter()
    .filter_map(|c| table.column_index(c))
    .collect();
  order.sort_by(|&a, &b| {
    for &i in &sort_idx {
      let ord = table.rows()[a][i].cmp(&table.rows()[b][i]);
      if ord != std::cmp::Ordering::Equal {
        return ord;
      }
    }
    a.cmp(&b)
  });

  order
    .into_iter()
    .take(n)
    .map(|row| table.project(row, columns))
    .collect()
}

fn dedup_cols<'c>(cols: impl IntoIterator<Item = &'c str>) -> Vec<&'c str> {
  let mut seen = BTreeSet::new();
  cols.into_iter().filter(|c| seen.insert(*c)).collect()
}

fn sample_sort_for<'s>(spec: &'s ValidationSpec, table: &str) -> Vec<&'s str> {
  spec
    .tables
    .get(table)
    .map(|r| r.sample_sort.iter().map(String::as_str).collect())
    .unwrap_or_default()
}

// ─── Hard phase ──────────────────────────────────────────────────────────────

pub fn hard_validate(ctx: &CheckContext<'_>) -> Vec<ValidationIssue> {
  let mut issues = Vec::new();
  let mut state = HardState { stop: false };

  check_required_tables(ctx, &mut issues, &mut state);
  if state.stop {
    return issues;
  }
  check_schema_null_uniqueness(ctx, &mut issues);
  check_foreign_keys(ctx, &mut issues);
  check_pattern_stop_sequences(ctx, &mut issues);
  check_unresolved_gating(ctx, &mut issues);

  issues
}

fn check_required_tables(
  ctx: &CheckContext<'_>,
  issues: &mut Vec<ValidationIssue>,
  state: &mut HardState,
) {
  for t in &ctx.spec.required_tables {
    if !ctx.tables.contains_key(t) {
      issues.push(ValidationIssue {
        severity: Severity::Error,
        code:     IssueCode::TableMissing,
        table:    t.clone(),
        message:  format!(
          "required canonical table '{t}' is missing for spec '{}'",
          ctx.spec.spec_id
        ),
        count:    1,
        columns:  Vec::new(),
        samples:  Vec::new(),
        source_hint: None,
      });
    }
  }

  if ctx.cfg.hard_stop_on_missing_core
    && !ctx.spec.core_tables.is_empty()
    && ctx
      .spec
      .core_tables
      .iter()
      .all(|t| !ctx.tables.contains_key(t))
  {
    tracing::warn!(
      spec = %ctx.spec.spec_id,
      "core table set entirely absent, stopping hard phase"
    );
    state.stop = true;
  }
}

fn check_schema_null_uniqueness(
  ctx: &CheckContext<'_>,
  issues: &mut Vec<ValidationIssue>,
) {
  for (table_name, rule) in &ctx.spec.tables {
    let Some(table) = ctx.tables.get(table_name) else { continue };

    // Required columns (aliases: first present wins). One issue per table
    // listing every unresolved reference.
    let missing: Vec<String> = rule
      .required_columns
      .iter()
      .filter(|r| r.resolve(table).is_none())
      .map(|r| r.display())
      .collect();
    if !missing.is_empty() {
      issues.push(ValidationIssue {
        severity: Severity::Error,
        code:     IssueCode::SchemaMissingColumns,
        table:    table_name.clone(),
        message:  format!(
          "table '{table_name}' is missing required columns (or aliases): {}",
          missing.join(", ")
        ),
        count:    missing.len() as u64,
        columns:  missing,
        samples:  Vec::new(),
        source_hint: None,
      });
    }

    // Declared-not-null columns.
    let sort_cols = sample_sort_for(ctx.spec, table_name);
    for col_ref in &rule.not_null_columns {
      let Some(col) = col_ref.resolve(table) else { continue };
      let idx = table.column_index(col).unwrap_or_default();
      let null_rows: Vec<usize> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, r)| r[idx].is_null())
        .map(|(i, _)| i)
        .collect();
      if null_rows.is_empty() {
        continue;
      }
      let cols =
        dedup_cols(sort_cols.iter().copied().chain(std::iter::once(col)));
      issues.push(ValidationIssue {
        severity: Severity::Error,
        code:     IssueCode::KeyColumnNull,
        table:    table_name.clone(),
        message:  format!("key column '{col}' in '{table_name}' contains NULLs"),
        count:    null_rows.len() as u64,
        columns:  vec![col.to_owned()],
        samples:  take_samples(
          table,
          &null_rows,
          &cols,
          &sort_cols,
          ctx.cfg.sample_size,
        ),
        source_hint: None,
      });
    }

    // Declared unique column sets. Skip rules whose columns are absent —
    // the required-columns check already reported them where relevant.
    for unique in &rule.uniqueness {
      let resolved: Vec<&str> = unique
        .columns
        .iter()
        .filter_map(|r| r.resolve(table))
        .collect();
      if resolved.len() != unique.columns.len() {
        continue;
      }
      let idxs: Vec<usize> = resolved
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

      let mut groups: BTreeMap<Vec<Value>, Vec<usize>> = BTreeMap::new();
      for (row, cells) in table.rows().iter().enumerate() {
        let key: Vec<Value> = idxs.iter().map(|&i| cells[i].clone()).collect();
        groups.entry(key).or_default().push(row);
      }
      let dup_rows: Vec<usize> = groups
        .values()
        .filter(|rows| rows.len() > 1)
        .flatten()
        .copied()
        .collect();
      if dup_rows.is_empty() {
        continue;
      }

      let cols =
        dedup_cols(sort_cols.iter().copied().chain(resolved.iter().copied()));
      issues.push(ValidationIssue {
        severity: unique.severity,
        code:     IssueCode::UniquenessViolation,
        table:    table_name.clone(),
        message:  unique.message.clone().unwrap_or_else(|| {
          format!("uniqueness violated on ({})", resolved.join(", "))
        }),
        count:    dup_rows.len() as u64,
        columns:  resolved.iter().map(|c| (*c).to_owned()).collect(),
        samples:  take_samples(
          table,
          &dup_rows,
          &cols,
          &sort_cols,
          ctx.cfg.sample_size,
        ),
        source_hint: None,
      });
    }
  }
}

// ─── Foreign keys ────────────────────────────────────────────────────────────

fn check_foreign_keys(ctx: &CheckContext<'_>, issues: &mut Vec<ValidationIssue>) {
  for fk in &ctx.spec.foreign_keys {
    let (Some(child), Some(parent)) = (
      ctx.tables.get(&fk.child_table),
      ctx.tables.get(&fk.parent_table),
    ) else {
      continue;
    };
    let (Some(child_col), Some(parent_col)) =
      (fk.child_col.resolve(child), fk.parent_col.resolve(parent))
    else {
      continue;
    };

    let child_idx = child.column_index(child_col).unwrap_or_default();
    let parent_idx = parent.column_index(parent_col).unwrap_or_default();

    let parent_keys: BTreeSet<&Value> =
      parent.rows().iter().map(|r| &r[parent_idx]).collect();

    let missing_rows: Vec<usize> = child
      .rows()
      .iter()
      .enumerate()
      .filter(|(_, r)| {
        let v = &r[child_idx];
        if v.is_null() {
          !fk.only_check_non_null
        } else {
          !parent_keys.contains(v)
        }
      })
      .map(|(i, _)| i)
      .collect();
    if missing_rows.is_empty() {
      continue;
    }

    let mut sort_cols = sample_sort_for(ctx.spec, &fk.child_table);
    if sort_cols.is_empty() {
      sort_cols = vec![child_col];
    }
    let cols =
      dedup_cols(sort_cols.iter().copied().chain(std::iter::once(child_col)));
    let mut samples = take_samples(
      child,
      &missing_rows,
      &cols,
      &sort_cols,
      ctx.cfg.sample_size,
    );

    // Enrichment attaches upstream identifiers to the samples so a human
    // can locate the bad source row. It never changes pass/fail or count.
    let source_hint = enrich_samples(ctx, fk, child, &mut samples);

    issues.push(ValidationIssue {
      severity: fk.severity,
      code:     IssueCode::FkMissing,
      table:    fk.child_table.clone(),
      message:  fk.message.clone().unwrap_or_else(|| {
        format!(
          "{}.{child_col} contains values not present in {}.{parent_col}",
          fk.child_table, fk.parent_table
        )
      }),
      count:    missing_rows.len() as u64,
      columns:  vec![child_col.to_owned()],
      samples,
      source_hint,
    });
  }
}

/// The first declared mapping table present for `key_column`.
fn mapping_for_key<'a>(
  ctx: &'a CheckContext<'_>,
  key_column: &str,
) -> Option<(&'a MappingRule, &'a str, &'a Table)> {
  let rule = ctx
    .spec
    .mappings
    .iter()
    .find(|m| m.key_column == key_column)?;
  rule.tables.iter().find_map(|name| {
    ctx
      .mappings
      .get(name)
      .filter(|t| t.has_column(key_column))
      .map(|t| (rule, name.as_str(), t))
  })
}

fn enrich_samples(
  ctx: &CheckContext<'_>,
  fk: &ForeignKeyRule,
  child: &Table,
  samples: &mut [SampleRow],
) -> Option<String> {
  let mut hints: Vec<String> = Vec::new();

  for key in &fk.hint_join_keys {
    if !child.has_column(key) {
      continue;
    }
    let Some((rule, map_name, map)) = mapping_for_key(ctx, key) else {
      continue;
    };
    let hint_cols: Vec<&str> = rule
      .hint_columns
      .iter()
      .map(String::as_str)
      .filter(|c| map.has_column(c))
      .collect();
    if hint_cols.is_empty() {
      continue;
    }

    // key value → first mapping row in deterministic order.
    let key_idx = map.column_index(key).unwrap_or_default();
    let order = map.sorted_indices(
      &std::iter::once(key)
        .map(String::as_str)
        .chain(hint_cols.iter().copied())
        .collect::<Vec<_>>(),
    );
    let mut first_by_key: BTreeMap<&Value, usize> = BTreeMap::new();
    for row in order {
      first_by_key.entry(&map.rows()[row][key_idx]).or_insert(row);
    }

    for sample in samples.iter_mut() {
      let Some(key_val) = sample.get(key.as_str()).cloned() else { continue };
      let Some(&map_row) = first_by_key.get(&key_val) else { continue };
      for col in &hint_cols {
        let idx = map.column_index(col).unwrap_or_default();
        sample.insert(
          format!("src_{col}"),
          map.rows()[map_row][idx].clone(),
        );
      }
    }
    hints.push(format!("{map_name} on {key}"));
  }

  if hints.is_empty() {
    None
  } else {
    Some(format!("enriched via {}", hints.join("; ")))
  }
}

// ─── Pattern sequences ───────────────────────────────────────────────────────

struct SeqAgg {
  min:      i64,
  max:      i64,
  distinct: BTreeSet<i64>,
  rows:     u64,
}

fn check_pattern_stop_sequences(
  ctx: &CheckContext<'_>,
  issues: &mut Vec<ValidationIssue>,
) {
  let Some(ps) = ctx.tables.get("pattern_stops") else { return };
  let (Some(pid_idx), Some(seq_idx)) =
    (ps.column_index("pattern_id"), ps.column_index("seq"))
  else {
    return;
  };

  let mut agg: BTreeMap<Value, SeqAgg> = BTreeMap::new();
  for row in ps.rows() {
    let Some(seq) = row[seq_idx].as_int() else { continue };
    let entry = agg.entry(row[pid_idx].clone()).or_insert(SeqAgg {
      min:      seq,
      max:      seq,
      distinct: BTreeSet::new(),
      rows:     0,
    });
    entry.min = entry.min.min(seq);
    entry.max = entry.max.max(seq);
    entry.distinct.insert(seq);
    entry.rows += 1;
  }

  let base_sample = |pid: &Value, a: &SeqAgg| -> SampleRow {
    let mut s = SampleRow::new();
    s.insert("pattern_id".to_owned(), pid.clone());
    s.insert("min_seq".to_owned(), Value::Int(a.min));
    s.insert("max_seq".to_owned(), Value::Int(a.max));
    s.insert("distinct_seq".to_owned(), Value::Int(a.distinct.len() as i64));
    s.insert("row_count".to_owned(), Value::Int(a.rows as i64));
    s
  };

  let bad_base: Vec<(&Value, &SeqAgg)> = agg
    .iter()
    .filter(|(_, a)| a.min != ctx.cfg.seq_base)
    .collect();
  if !bad_base.is_empty() {
    issues.push(ValidationIssue {
      severity: Severity::Error,
      code:     IssueCode::PatternSeqBaseMismatch,
      table:    "pattern_stops".to_owned(),
      message:  format!(
        "pattern_stops.seq must start at {} per pattern",
        ctx.cfg.seq_base
      ),
      count:    bad_base.len() as u64,
      columns:  vec!["pattern_id".to_owned(), "seq".to_owned()],
      samples:  bad_base
        .iter()
        .take(ctx.cfg.sample_size)
        .map(|(pid, a)| base_sample(pid, a))
        .collect(),
      source_hint: None,
    });
  }

  if ctx.cfg.require_contiguous_seq {
    // No gaps and no duplicates: the distinct count must span the observed
    // range exactly, and every row must carry a distinct seq.
    let bad_gap: Vec<(&Value, &SeqAgg)> = agg
      .iter()
      .filter(|(_, a)| {
        let span = a.max - a.min + 1;
        a.distinct.len() as i64 != span || a.rows != a.distinct.len() as u64
      })
      .collect();
    if !bad_gap.is_empty() {
      issues.push(ValidationIssue {
        severity: Severity::Error,
        code:     IssueCode::PatternSeqGapsOrDupes,
        table:    "pattern_stops".to_owned(),
        message:  "pattern_stops.seq must be contiguous per pattern".to_owned(),
        count:    bad_gap.len() as u64,
        columns:  vec!["pattern_id".to_owned(), "seq".to_owned()],
        samples:  bad_gap
          .iter()
          .take(ctx.cfg.sample_size)
          .map(|(pid, a)| base_sample(pid, a))
          .collect(),
        source_hint: None,
      });
    }
  }
}

// ─── Unresolved gating ───────────────────────────────────────────────────────

fn check_unresolved_gating(
  ctx: &CheckContext<'_>,
  issues: &mut Vec<ValidationIssue>,
) {
  for (name, rule) in &ctx.spec.unresolved {
    let Some(table) = ctx.unresolved.get(name) else { continue };
    if name.as_str() == "fare_orphans" && ctx.cfg.allow_unresolved_fares {
      continue;
    }
    if !rule.fail_if_nonempty || table.is_empty() {
      continue;
    }

    let cols: Vec<&str> = table
      .columns()
      .iter()
      .take(6)
      .map(String::as_str)
      .collect();
    let sort_cols: Vec<&str> = rule
      .sample_sort
      .iter()
      .map(String::as_str)
      .filter(|c| table.has_column(c))
      .collect();
    let all_rows: Vec<usize> = (0..table.len()).collect();

    issues.push(ValidationIssue {
      severity: Severity::Error,
      code:     IssueCode::UnresolvedNonempty,
      table:    format!("unresolved/{name}"),
      message:  format!(
        "unresolved table '{name}' is non-empty and is disallowed by spec '{}'",
        ctx.spec.spec_id
      ),
      count:    table.len() as u64,
      columns:  cols.iter().map(|c| (*c).to_owned()).collect(),
      samples:  take_samples(table, &all_rows, &cols, &sort_cols, ctx.cfg.sample_size),
      source_hint: None,
    });
  }
}

// ─── Soft phase ──────────────────────────────────────────────────────────────

pub fn soft_validate(tables: &Tables, cfg: &ValidateConfig) -> Vec<ValidationIssue> {
  let mut issues = Vec::new();

  if let Some(ps) = tables.get("pattern_stops") {
    if let Some(pid_idx) = ps.column_index("pattern_id") {
      let mut lens: BTreeMap<Value, u64> = BTreeMap::new();
      for row in ps.rows() {
        *lens.entry(row[pid_idx].clone()).or_insert(0) += 1;
      }

      let shape_sample = |pid: &Value, n: u64| -> SampleRow {
        let mut s = SampleRow::new();
        s.insert("pattern_id".to_owned(), pid.clone());
        s.insert("stop_count".to_owned(), Value::Int(n as i64));
        s
      };

      let short: Vec<_> = lens
        .iter()
        .filter(|&(_, &n)| (n as usize) < cfg.min_pattern_stops_warn)
        .collect();
      if !short.is_empty() {
        issues.push(ValidationIssue {
          severity: Severity::Warn,
          code:     IssueCode::PatternTooShort,
          table:    "pattern_stops".to_owned(),
          message:  format!(
            "patterns with fewer than {} stops detected",
            cfg.min_pattern_stops_warn
          ),
          count:    short.len() as u64,
          columns:  vec!["pattern_id".to_owned()],
          samples:  short
            .iter()
            .take(cfg.sample_size)
            .map(|&(ref pid, &n)| shape_sample(pid, n))
            .collect(),
          source_hint: None,
        });
      }

      let long: Vec<_> = lens
        .iter()
        .filter(|&(_, &n)| (n as usize) > cfg.max_pattern_stops_warn)
        .collect();
      if !long.is_empty() {
        issues.push(ValidationIssue {
          severity: Severity::Warn,
          code:     IssueCode::PatternTooLong,
          table:    "pattern_stops".to_owned(),
          message:  format!(
            "patterns with more than {} stops detected",
            cfg.max_pattern_stops_warn
          ),
          count:    long.len() as u64,
          columns:  vec!["pattern_id".to_owned()],
          samples:  long
            .iter()
            .take(cfg.sample_size)
            .map(|&(ref pid, &n)| shape_sample(pid, n))
            .collect(),
          source_hint: None,
        });
      }
    }
  }

  if let (Some(routes), Some(fare_rules)) =
    (tables.get("routes"), tables.get("fare_rules"))
  {
    if let (Some(rid_idx), Some(frid_idx)) = (
      routes.column_index("route_id"),
      fare_rules.column_index("route_id"),
    ) {
      let fare_routes: BTreeSet<&Value> = fare_rules
        .rows()
        .iter()
        .map(|r| &r[frid_idx])
        .filter(|v| !v.is_null())
        .collect();
      let missing_rows: Vec<usize> = routes
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, r)| !fare_routes.contains(&r[rid_idx]))
        .map(|(i, _)| i)
        .collect();
      if !missing_rows.is_empty() {
        let cols: Vec<&str> = ["route_id", "route_key", "operator_id"]
          .into_iter()
          .filter(|c| routes.has_column(c))
          .collect();
        issues.push(ValidationIssue {
          severity: Severity::Warn,
          code:     IssueCode::RouteMissingFares,
          table:    "routes".to_owned(),
          message:  "routes with no fare_rules detected".to_owned(),
          count:    missing_rows.len() as u64,
          columns:  vec!["route_id".to_owned()],
          samples:  take_samples(
            routes,
            &missing_rows,
            &cols,
            &["route_id"],
            cfg.sample_size,
          ),
          source_hint: None,
        });
      }
    }
  }

  issues
}
