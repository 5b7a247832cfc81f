use serde::{Deserialize, Serialize};

/// Newtype to avoid confusion between schema names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema(pub String);

/// Newtype for table names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName(pub String);

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Newtype for column names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ColumnName(pub String);

impl ColumnName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ColumnName {
    fn from(s: &str) -> Self {
        ColumnName(s.to_string())
    }
}

/// Columns excluded from hashing and comparison (typically ETL metadata such
/// as `etl_loaded_at` or `batch_id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredColumns(pub Vec<String>);

impl IgnoredColumns {
    pub fn contains(&self, col: &str) -> bool {
        self.0.iter().any(|c| c == col)
    }

    /// Union of two ignore lists, preserving first-seen order.
    pub fn union(&self, other: &IgnoredColumns) -> IgnoredColumns {
        let mut merged = self.0.clone();
        for col in &other.0 {
            if !merged.contains(col) {
                merged.push(col.clone());
            }
        }
        IgnoredColumns(merged)
    }
}

/// Which side of the comparison a table or query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Identifying key of a logical row: the canonical text of each key column,
/// in key-column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(pub Vec<String>);

impl RowKey {
    /// Render as `col=value, col=value` for logs and reports.
    pub fn describe(&self, key_cols: &[ColumnName]) -> String {
        key_cols
            .iter()
            .zip(&self.0)
            .map(|(c, v)| format!("{}={}", c.0, v.replace('\u{0}', "")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
