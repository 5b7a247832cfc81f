use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A single column value as read from either database.
///
/// Drivers disagree on native types (MySQL `TINYINT(1)` vs PostgreSQL
/// `boolean`, `DECIMAL` as text vs float, timestamp precision), so rows are
/// decoded into this closed set first and normalized by
/// [`crate::domain::canonical::RowCodec`] afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal digits as delivered by the driver (`"150.00"`).
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

/// A database row: column name → cell, sorted by column name.
pub type RawRow = BTreeMap<String, Cell>;

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn decimal(s: impl Into<String>) -> Self {
        Cell::Decimal(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Short type label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Int(_) => "int",
            Cell::Float(_) => "float",
            Cell::Decimal(_) => "decimal",
            Cell::Text(_) => "text",
            Cell::Date(_) => "date",
            Cell::Timestamp(_) => "timestamp",
            Cell::TimestampTz(_) => "timestamptz",
            Cell::Json(_) => "json",
            Cell::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Int(v as i64)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_unit(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) => serializer.serialize_f64(*f),
            Cell::Decimal(s) | Cell::Text(s) => serializer.serialize_str(s),
            Cell::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Cell::Timestamp(ts) => {
                serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Cell::TimestampTz(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            Cell::Json(v) => v.serialize(serializer),
            Cell::Bytes(b) => serializer.serialize_str(&format!("\\x{}", hex::encode(b))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_into_cell_maps_none_to_null() {
        let none: Option<i64> = None;
        assert_eq!(Cell::from(none), Cell::Null);
        assert_eq!(Cell::from(Some(7i64)), Cell::Int(7));
    }

    #[test]
    fn serializes_as_plain_json_values() {
        let row: RawRow = [
            ("amount".to_string(), Cell::decimal("150.00")),
            ("id".to_string(), Cell::Int(1)),
            ("note".to_string(), Cell::Null),
            ("raw".to_string(), Cell::Bytes(vec![0xde, 0xad])),
        ]
        .into();
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(
            v,
            json!({"amount": "150.00", "id": 1, "note": null, "raw": "\\xdead"})
        );
    }
}
