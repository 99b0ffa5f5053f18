//! Fare segment compression.
//!
//! A dense (route × origin × destination) fare matrix compresses into the
//! minimum number of contiguous destination-sequence ranges per
//! (route, fare product, origin) that share one price. Reconstruction is
//! exact: every original cell falls inside exactly one segment carrying its
//! amount.

use std::collections::BTreeMap;

use serde::Serialize;

// ─── Row types ───────────────────────────────────────────────────────────────

/// One origin→destination price cell, after product choice and dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FareCell {
  pub route_id:        i64,
  pub fare_product_id: i64,
  pub origin_seq:      i64,
  pub destination_seq: i64,
  pub amount_cents:    i64,
}

/// A maximal run of consecutive destinations sharing one amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FareSegment {
  pub route_id:        i64,
  pub fare_product_id: i64,
  pub origin_seq:      i64,
  pub dest_from_seq:   i64,
  pub dest_to_seq:     i64,
  pub amount_cents:    i64,
  pub is_default:      bool,
}

impl FareSegment {
  fn group(&self) -> (i64, i64, i64) {
    (self.route_id, self.fare_product_id, self.origin_seq)
  }
}

/// A fare rule row with both endpoints present.
#[derive(Debug, Clone)]
pub struct FareRuleRow {
  pub fare_rule_id:    i64,
  pub route_id:        i64,
  pub origin_seq:      i64,
  pub destination_seq: i64,
}

#[derive(Debug, Clone)]
pub struct FareAmountRow {
  pub fare_rule_id:    i64,
  pub fare_product_id: i64,
  pub amount_cents:    i64,
  pub is_default:      bool,
}

// ─── Product choice & dedup ──────────────────────────────────────────────────

/// Pick the one amount that represents each rule in the default view: the
/// amount marked default, or the numerically smallest product id when none
/// is marked. Duplicate cells (same route/product/origin/destination)
/// collapse to the minimum amount. Output is sorted by
/// (route, product, origin, destination).
pub fn materialize_cells(
  rules: &[FareRuleRow],
  amounts: &[FareAmountRow],
) -> Vec<FareCell> {
  // fare_rule_id → chosen (product, amount).
  let mut chosen: BTreeMap<i64, (i64, i64, bool)> = BTreeMap::new();
  for amount in amounts {
    let candidate = (
      amount.fare_product_id,
      amount.amount_cents,
      amount.is_default,
    );
    chosen
      .entry(amount.fare_rule_id)
      .and_modify(|current| {
        let keep_candidate = match (candidate.2, current.2) {
          (true, false) => true,
          (false, true) => false,
          _ => candidate.0 < current.0,
        };
        if keep_candidate {
          *current = candidate;
        }
      })
      .or_insert(candidate);
  }

  let mut cells: BTreeMap<(i64, i64, i64, i64), i64> = BTreeMap::new();
  for rule in rules {
    let Some(&(product, amount, _)) = chosen.get(&rule.fare_rule_id) else {
      continue;
    };
    let key = (rule.route_id, product, rule.origin_seq, rule.destination_seq);
    cells
      .entry(key)
      .and_modify(|a| *a = (*a).min(amount))
      .or_insert(amount);
  }

  cells
    .into_iter()
    .map(|((route_id, fare_product_id, origin_seq, destination_seq), amount_cents)| {
      FareCell {
        route_id,
        fare_product_id,
        origin_seq,
        destination_seq,
        amount_cents,
      }
    })
    .collect()
}

// ─── Segmentation ────────────────────────────────────────────────────────────

/// Compress cells into segments. A new segment starts whenever the
/// destination is not exactly one past the previous cell's, or the amount
/// differs. Segment count is always ≤ cell count.
pub fn build_fare_segments(mut cells: Vec<FareCell>) -> Vec<FareSegment> {
  cells.sort_by_key(|c| {
    (c.route_id, c.fare_product_id, c.origin_seq, c.destination_seq)
  });

  let mut segments: Vec<FareSegment> = Vec::new();
  for cell in &cells {
    let extend = segments.last().is_some_and(|seg| {
      seg.group() == (cell.route_id, cell.fare_product_id, cell.origin_seq)
        && cell.destination_seq == seg.dest_to_seq + 1
        && cell.amount_cents == seg.amount_cents
    });
    if extend {
      if let Some(seg) = segments.last_mut() {
        seg.dest_to_seq = cell.destination_seq;
      }
    } else {
      segments.push(FareSegment {
        route_id:        cell.route_id,
        fare_product_id: cell.fare_product_id,
        origin_seq:      cell.origin_seq,
        dest_from_seq:   cell.destination_seq,
        dest_to_seq:     cell.destination_seq,
        amount_cents:    cell.amount_cents,
        is_default:      true,
      });
    }
  }
  segments
}

/// Look up the amount for one destination: the segment with the greatest
/// `dest_from_seq ≤ destination_seq` in the group, accepted only if the
/// destination also falls at or before `dest_to_seq`. Segments within a
/// group are disjoint and ordered, so at most one can match.
///
/// `segments` must be sorted as produced by [`build_fare_segments`].
pub fn lookup_amount(
  segments: &[FareSegment],
  route_id: i64,
  fare_product_id: i64,
  origin_seq: i64,
  destination_seq: i64,
) -> Option<i64> {
  let target = (route_id, fare_product_id, origin_seq, destination_seq);
  let idx = segments.partition_point(|seg| {
    (seg.route_id, seg.fare_product_id, seg.origin_seq, seg.dest_from_seq)
      <= target
  });
  let seg = &segments[idx.checked_sub(1)?];
  (seg.group() == (route_id, fare_product_id, origin_seq)
    && destination_seq <= seg.dest_to_seq)
    .then_some(seg.amount_cents)
}
