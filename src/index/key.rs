//! Scalar projection of document values into index cells
//!
//! Documents are schemaless, so index columns carry no declared type. A
//! field value is projected onto one of SQLite's storage classes:
//!
//! - string → TEXT
//! - integer → INTEGER, float → REAL
//! - bool → INTEGER 0 / 1
//! - null, missing, array, object → NULL
//!
//! The same projection and ordering are used when evaluating predicates in
//! process, so a query returns the same documents whichever path runs it.

use std::cmp::Ordering;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde_json::Value;

/// A single index cell value
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    /// Absent or non-scalar value
    Null,
    /// Integer value (booleans included)
    Int(i64),
    /// Floating point value
    Real(f64),
    /// String value
    Text(String),
}

impl IndexKey {
    /// Project a JSON value. Non-scalars become `Null`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => IndexKey::Int(i64::from(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    IndexKey::Int(i)
                } else if let Some(f) = n.as_f64() {
                    // -0.0 and 0.0 are one value to SQLite
                    IndexKey::Real(if f == 0.0 { 0.0 } else { f })
                } else {
                    IndexKey::Null
                }
            }
            Value::String(s) => IndexKey::Text(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => IndexKey::Null,
        }
    }

    /// Project the value at `path` inside `body`. Missing paths become `Null`.
    pub fn from_path(body: &Value, path: &str) -> Self {
        extract_path(body, path)
            .map(IndexKey::from_json)
            .unwrap_or(IndexKey::Null)
    }

    /// Whether a JSON value survives projection unchanged in meaning
    pub fn is_scalar(value: &Value) -> bool {
        matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IndexKey::Null)
    }

    /// Storage class rank: NULL < numeric < TEXT
    fn class_rank(&self) -> u8 {
        match self {
            IndexKey::Null => 0,
            IndexKey::Int(_) | IndexKey::Real(_) => 1,
            IndexKey::Text(_) => 2,
        }
    }

    /// Total order matching SQLite's comparison of untyped columns
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        let rank = self.class_rank().cmp(&other.class_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (IndexKey::Int(a), IndexKey::Int(b)) => a.cmp(b),
            (IndexKey::Int(a), IndexKey::Real(b)) => compare_int_real(*a, *b),
            (IndexKey::Real(a), IndexKey::Int(b)) => compare_int_real(*b, *a).reverse(),
            // JSON has no NaN
            (IndexKey::Real(a), IndexKey::Real(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (IndexKey::Text(a), IndexKey::Text(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// SQL equality: NULL never equals anything
    pub fn sql_eq(&self, other: &IndexKey) -> bool {
        !self.is_null() && !other.is_null() && self.compare(other) == Ordering::Equal
    }
}

/// Exact integer/float comparison, as SQLite does it. Casting the integer
/// to f64 would lose precision above 2^53.
fn compare_int_real(i: i64, f: f64) -> Ordering {
    // 2^63: the first float above every i64
    const I64_END: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() {
        return Ordering::Equal;
    }
    if f >= I64_END {
        return Ordering::Less;
    }
    if f < -I64_END {
        return Ordering::Greater;
    }

    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&f).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

/// Navigate a dotted field path through nested objects
pub fn extract_path<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

impl ToSql for IndexKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            IndexKey::Null => ToSqlOutput::Owned(SqlValue::Null),
            IndexKey::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            IndexKey::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            IndexKey::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for IndexKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => IndexKey::Null,
            ValueRef::Integer(i) => IndexKey::Int(i),
            ValueRef::Real(f) => IndexKey::Real(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                IndexKey::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}
