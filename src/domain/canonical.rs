//! Row canonicalization: the single place that decides what "equal" means.
//!
//! Every cell is rendered to text by an explicit rule for its [`Cell`]
//! variant. The rendered text is what gets hashed and diffed; the original
//! cell is kept alongside it so fix statements can be written with the
//! source's own values.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::cell::{Cell, RawRow};
use crate::domain::error::{ReconcileError, Result};
use crate::domain::table_spec::TableSpec;
use crate::domain::value_objects::RowKey;

/// Canonical text for SQL NULL. NUL cannot be stored in text columns of the
/// supported databases, so no real value collides with it.
pub const NULL_SENTINEL: &str = "\u{0}NULL";

/// Per-type normalization rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Round decimals half-up to this many fractional digits. `None` keeps
    /// the exact digits delivered by the driver, so `150.00 != 150.0`.
    pub decimal_scale: Option<u32>,
    /// Fractional digits kept for floating point values (trailing zeros are
    /// trimmed afterwards).
    pub float_precision: usize,
    /// Fractional second digits kept for timestamps (0..=9), truncated.
    pub timestamp_precision: u32,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            decimal_scale: None,
            float_precision: 6,
            timestamp_precision: 6,
        }
    }
}

/// A normalized cell: the original value and its canonical rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedCell {
    pub value: Cell,
    #[serde(skip)]
    pub canonical: String,
}

/// Row with ignored columns removed and columns sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalRow(pub BTreeMap<String, NormalizedCell>);

impl CanonicalRow {
    pub fn get(&self, col: &str) -> Option<&NormalizedCell> {
        self.0.get(col)
    }

    /// `(column, canonical text)` pairs in column order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.canonical.as_str()))
    }

    /// Original cells, for reporting and fix statements.
    pub fn values(&self) -> RawRow {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    /// Names of columns whose canonical text differs between two rows.
    /// Columns present on one side only count as differing.
    pub fn differing_columns(&self, other: &CanonicalRow) -> Vec<String> {
        let mut cols: Vec<String> = self
            .0
            .iter()
            .filter(|(k, v)| other.0.get(*k).map(|o| o.canonical != v.canonical).unwrap_or(true))
            .map(|(k, _)| k.clone())
            .collect();
        cols.extend(
            other
                .0
                .keys()
                .filter(|k| !self.0.contains_key(*k))
                .cloned(),
        );
        cols.sort();
        cols
    }
}

/// Canonicalizes raw rows for one table.
///
/// Cheap to build; one per table pass.
pub struct RowCodec<'a> {
    spec: &'a TableSpec,
    rules: &'a NormalizationRules,
}

impl<'a> RowCodec<'a> {
    pub fn new(spec: &'a TableSpec, rules: &'a NormalizationRules) -> Self {
        Self { spec, rules }
    }

    /// Keep the TableSpec's compared columns, normalize them, sort by name.
    ///
    /// Fails with `SchemaMismatch` if a compared column is absent from `raw`.
    pub fn canonicalize(&self, raw: &RawRow) -> Result<CanonicalRow> {
        let mut out = BTreeMap::new();
        for col in &self.spec.columns {
            let cell = raw.get(&col.0).ok_or_else(|| {
                ReconcileError::schema(
                    &self.spec.source_table.0,
                    format!("column {} missing from fetched row", col.0),
                )
            })?;
            out.insert(
                col.0.clone(),
                NormalizedCell {
                    canonical: normalize(cell, self.rules),
                    value: cell.clone(),
                },
            );
        }
        Ok(CanonicalRow(out))
    }

    /// Identifying key of a canonical row, in key-column order.
    pub fn key_of(&self, row: &CanonicalRow) -> RowKey {
        RowKey(
            self.spec
                .key_columns
                .iter()
                .map(|k| {
                    row.get(&k.0)
                        .map(|c| c.canonical.clone())
                        .unwrap_or_else(|| NULL_SENTINEL.to_string())
                })
                .collect(),
        )
    }

    /// Original key cells of a row, for WHERE predicates and point lookups.
    pub fn key_cells(&self, row: &CanonicalRow) -> Vec<(String, Cell)> {
        self.spec
            .key_columns
            .iter()
            .map(|k| {
                let cell = row.get(&k.0).map(|c| c.value.clone()).unwrap_or(Cell::Null);
                (k.0.clone(), cell)
            })
            .collect()
    }
}

/// Render one cell to its canonical text.
pub fn normalize(cell: &Cell, rules: &NormalizationRules) -> String {
    match cell {
        Cell::Null => NULL_SENTINEL.to_string(),
        Cell::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => format_float(*f, rules.float_precision),
        Cell::Decimal(s) => match rules.decimal_scale {
            Some(scale) => round_decimal(s, scale).unwrap_or_else(|| s.trim().to_string()),
            None => s.trim().to_string(),
        },
        Cell::Text(s) => s.clone(),
        Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        Cell::Timestamp(ts) => {
            format_timestamp(&ts.format("%Y-%m-%dT%H:%M:%S").to_string(), ts.nanosecond(), rules)
        }
        Cell::TimestampTz(ts) => {
            let base = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
            format!("{}Z", format_timestamp(&base, ts.nanosecond(), rules))
        }
        Cell::Json(v) => {
            let mut out = String::new();
            canonical_json(v, &mut out);
            out
        }
        Cell::Bytes(b) => format!("\\x{}", hex::encode(b)),
    }
}

/// Compact JSON with object keys sorted, whatever map ordering serde_json
/// was built with.
fn canonical_json(v: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(k, _)| *k);
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                canonical_json(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_json(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn format_float(f: f64, precision: usize) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{:.*}", precision, f);
    let s = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    };
    if s == "-0" {
        "0".to_string()
    } else {
        s
    }
}

fn format_timestamp(base: &str, nanos: u32, rules: &NormalizationRules) -> String {
    let digits = rules.timestamp_precision.min(9);
    if digits == 0 {
        return base.to_string();
    }
    // leap seconds carry nanos >= 1e9
    let frac = format!("{:09}", nanos % 1_000_000_000);
    format!("{}.{}", base, &frac[..digits as usize])
}

/// Round a decimal string half-up to `scale` fractional digits.
/// Returns `None` when the input is not a plain decimal number.
pub fn round_decimal(s: &str, scale: u32) -> Option<String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let scale = scale as usize;
    let mut all: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(scale))
        .map(|b| b - b'0')
        .collect();
    if all.is_empty() {
        all.push(0);
    }

    let round_up = frac_part.as_bytes().get(scale).map(|d| *d >= b'5').unwrap_or(false);
    if round_up {
        let mut i = all.len();
        loop {
            if i == 0 {
                all.insert(0, 1);
                break;
            }
            i -= 1;
            if all[i] == 9 {
                all[i] = 0;
            } else {
                all[i] += 1;
                break;
            }
        }
    }

    let split = all.len() - scale;
    let int_digits: String = all[..split].iter().map(|d| (d + b'0') as char).collect();
    let int_digits = int_digits.trim_start_matches('0');
    let int_digits = if int_digits.is_empty() { "0" } else { int_digits };
    let frac_digits: String = all[split..].iter().map(|d| (d + b'0') as char).collect();

    let is_zero = int_digits == "0" && frac_digits.bytes().all(|b| b == b'0');
    let sign = if negative && !is_zero { "-" } else { "" };
    Some(if scale == 0 {
        format!("{}{}", sign, int_digits)
    } else {
        format!("{}{}.{}", sign, int_digits, frac_digits)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table_spec::KeyKind;
    use crate::domain::value_objects::{ColumnName, IgnoredColumns, TableName};
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn spec(cols: &[&str], key: &[&str], ignored: &[&str]) -> TableSpec {
        TableSpec::new(
            TableName("orders".into()),
            TableName("orders".into()),
            cols.iter().map(|c| ColumnName::from(*c)).collect(),
            key.iter().map(|c| ColumnName::from(*c)).collect(),
            KeyKind::PrimaryKey,
            IgnoredColumns(ignored.iter().map(|c| c.to_string()).collect()),
        )
        .unwrap()
    }

    fn raw(pairs: &[(&str, Cell)]) -> RawRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn drops_ignored_columns_and_sorts() {
        let spec = spec(&["id", "name", "etl_ts"], &["id"], &["etl_ts"]);
        let rules = NormalizationRules::default();
        let codec = RowCodec::new(&spec, &rules);
        let row = codec
            .canonicalize(&raw(&[
                ("name", Cell::text("a")),
                ("etl_ts", Cell::text("2024")),
                ("id", Cell::Int(1)),
            ]))
            .unwrap();
        let cols: Vec<&str> = row.pairs().map(|(c, _)| c).collect();
        assert_eq!(cols, vec!["id", "name"]);
    }

    #[test]
    fn missing_compared_column_is_schema_mismatch() {
        let spec = spec(&["id", "name"], &["id"], &[]);
        let rules = NormalizationRules::default();
        let err = RowCodec::new(&spec, &rules)
            .canonicalize(&raw(&[("id", Cell::Int(1))]))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::SchemaMismatch { .. }));
    }

    #[test]
    fn null_is_distinct_from_empty_string() {
        let rules = NormalizationRules::default();
        assert_ne!(normalize(&Cell::Null, &rules), normalize(&Cell::text(""), &rules));
    }

    #[test]
    fn bools_and_ints_agree() {
        let rules = NormalizationRules::default();
        assert_eq!(normalize(&Cell::Bool(true), &rules), normalize(&Cell::Int(1), &rules));
        assert_eq!(normalize(&Cell::Bool(false), &rules), "0");
    }

    #[test]
    fn floats_use_fixed_precision() {
        let rules = NormalizationRules::default();
        assert_eq!(normalize(&Cell::Float(150.0), &rules), "150");
        assert_eq!(normalize(&Cell::Float(0.1 + 0.2), &rules), "0.3");
        assert_eq!(normalize(&Cell::Float(-0.0000001), &rules), "0");
        assert_eq!(normalize(&Cell::Float(f64::NAN), &rules), "NaN");
    }

    #[test]
    fn decimals_keep_digits_unless_scaled() {
        let exact = NormalizationRules::default();
        assert_ne!(
            normalize(&Cell::decimal("150.00"), &exact),
            normalize(&Cell::decimal("150.0"), &exact)
        );
        let scaled = NormalizationRules {
            decimal_scale: Some(2),
            ..Default::default()
        };
        assert_eq!(normalize(&Cell::decimal("150.0"), &scaled), "150.00");
        assert_eq!(normalize(&Cell::decimal("150.00"), &scaled), "150.00");
    }

    #[test]
    fn round_decimal_half_up_with_carry() {
        assert_eq!(round_decimal("1.005", 2).as_deref(), Some("1.01"));
        assert_eq!(round_decimal("9.999", 2).as_deref(), Some("10.00"));
        assert_eq!(round_decimal("-0.004", 2).as_deref(), Some("0.00"));
        assert_eq!(round_decimal("-2.5", 0).as_deref(), Some("-3"));
        assert_eq!(round_decimal(".5", 1).as_deref(), Some("0.5"));
        assert_eq!(round_decimal("abc", 2), None);
    }

    #[test]
    fn timestamps_truncate_to_precision() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_nano_opt(10, 20, 30, 123_456_789)
            .unwrap();
        let micro = NormalizationRules::default();
        assert_eq!(normalize(&Cell::Timestamp(ts), &micro), "2024-03-01T10:20:30.123456");
        let millis = NormalizationRules {
            timestamp_precision: 3,
            ..Default::default()
        };
        assert_eq!(normalize(&Cell::Timestamp(ts), &millis), "2024-03-01T10:20:30.123");
        let tz = Utc.from_utc_datetime(&ts);
        assert_eq!(normalize(&Cell::TimestampTz(tz), &millis), "2024-03-01T10:20:30.123Z");
    }

    #[test]
    fn json_objects_are_key_order_independent() {
        let rules = NormalizationRules::default();
        let a = Cell::Json(json!({"a": 1, "b": [1, 2]}));
        let b = Cell::Json(json!({"b": [1, 2], "a": 1}));
        assert_eq!(normalize(&a, &rules), normalize(&b, &rules));
    }

    #[test]
    fn differing_columns_lists_only_changed_names() {
        let spec = spec(&["id", "amount", "status"], &["id"], &[]);
        let rules = NormalizationRules::default();
        let codec = RowCodec::new(&spec, &rules);
        let a = codec
            .canonicalize(&raw(&[
                ("id", Cell::Int(1)),
                ("amount", Cell::decimal("150.00")),
                ("status", Cell::text("paid")),
            ]))
            .unwrap();
        let b = codec
            .canonicalize(&raw(&[
                ("id", Cell::Int(1)),
                ("amount", Cell::decimal("150.0")),
                ("status", Cell::text("paid")),
            ]))
            .unwrap();
        assert_eq!(a.differing_columns(&b), vec!["amount".to_string()]);
        assert_eq!(codec.key_of(&a), RowKey(vec!["1".into()]));
    }
}
