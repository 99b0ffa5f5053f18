//! Cell values — the single dynamic type flowing through in-memory tables.
//!
//! Canonical tables arrive already typed by upstream normalization; within
//! this core a cell is one of NULL, integer, real or text, mirroring SQLite's
//! storage classes. The ordering is total and deterministic so that sample
//! sorting and primary-key sorting are stable across runs.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Int(i64),
  Real(f64),
  Text(String),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Self::Int(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  fn rank(&self) -> u8 {
    match self {
      Self::Null => 0,
      Self::Int(_) => 1,
      Self::Real(_) => 2,
      Self::Text(_) => 3,
    }
  }
}

impl Eq for Value {}

impl Ord for Value {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Self::Null, Self::Null) => Ordering::Equal,
      (Self::Int(a), Self::Int(b)) => a.cmp(b),
      (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
      (Self::Text(a), Self::Text(b)) => a.cmp(b),
      _ => self.rank().cmp(&other.rank()),
    }
  }
}

impl PartialOrd for Value {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => write!(f, "NULL"),
      Self::Int(n) => write!(f, "{n}"),
      Self::Real(r) => write!(f, "{r}"),
      Self::Text(s) => write!(f, "{s}"),
    }
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<f64> for Value {
  fn from(r: f64) -> Self { Self::Real(r) }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map_or(Self::Null, Into::into)
  }
}
