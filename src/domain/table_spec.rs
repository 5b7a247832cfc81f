use serde::Serialize;

use crate::domain::error::{ReconcileError, Result};
use crate::domain::value_objects::{ColumnName, IgnoredColumns, TableName};

/// How the identifying key of a table was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Declared in configuration for this table.
    Configured,
    PrimaryKey,
    UniqueConstraint,
    /// No key available: every compared column is part of the key.
    /// Duplicate rows become indistinguishable.
    AllColumns,
}

/// One column as reported by a [`crate::domain::ports::TableCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

/// Structure of one physical table on one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableShape {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique_keys: Vec<Vec<String>>,
}

impl TableShape {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Logical identity of a table pair, ready for reconciliation.
///
/// `columns` holds the compared columns only: ignored columns are already
/// removed, and key columns are guaranteed to be part of it.
#[derive(Debug, Clone, Serialize)]
pub struct TableSpec {
    pub source_table: TableName,
    pub target_table: TableName,
    pub columns: Vec<ColumnName>,
    pub key_columns: Vec<ColumnName>,
    pub key_kind: KeyKind,
    pub ignored: IgnoredColumns,
    pub warnings: Vec<String>,
}

impl TableSpec {
    /// Build a spec, enforcing the key invariants.
    ///
    /// With [`KeyKind::AllColumns`] the `key_columns` argument is ignored and
    /// the full column list becomes the key.
    pub fn new(
        source_table: TableName,
        target_table: TableName,
        columns: Vec<ColumnName>,
        key_columns: Vec<ColumnName>,
        key_kind: KeyKind,
        ignored: IgnoredColumns,
    ) -> Result<Self> {
        let columns: Vec<ColumnName> = columns
            .into_iter()
            .filter(|c| !ignored.contains(&c.0))
            .collect();
        if columns.is_empty() {
            return Err(ReconcileError::schema(
                &source_table.0,
                "no columns left to compare after removing ignored columns",
            ));
        }

        let mut warnings = Vec::new();
        let key_columns = if key_kind == KeyKind::AllColumns {
            warnings.push(format!(
                "table {} has no primary or unique key: all {} compared columns act as the key, \
                 duplicate rows collapse into one",
                source_table.0,
                columns.len()
            ));
            columns.clone()
        } else {
            if key_columns.is_empty() {
                return Err(ReconcileError::schema(
                    &source_table.0,
                    "identifying key must not be empty",
                ));
            }
            if let Some(k) = key_columns.iter().find(|k| ignored.contains(&k.0)) {
                return Err(ReconcileError::schema(
                    &source_table.0,
                    format!("key column {} is listed as ignored", k.0),
                ));
            }
            if let Some(k) = key_columns.iter().find(|k| !columns.contains(k)) {
                return Err(ReconcileError::schema(
                    &source_table.0,
                    format!("key column {} is not among the compared columns", k.0),
                ));
            }
            key_columns
        };

        Ok(Self {
            source_table,
            target_table,
            columns,
            key_columns,
            key_kind,
            ignored,
            warnings,
        })
    }

    /// Resolve a spec from the catalog shapes of both sides.
    ///
    /// Key choice: configured override, then the source primary key (which
    /// must match the target's), then the first unique constraint present on
    /// both sides, then all columns. Key columns listed as ignored are
    /// re-admitted with a warning.
    pub fn resolve(
        source_table: TableName,
        target_table: TableName,
        source: &TableShape,
        target: &TableShape,
        ignored: &IgnoredColumns,
        key_override: Option<&[String]>,
    ) -> Result<Self> {
        let table = source_table.0.clone();

        let (key, kind) = if let Some(cols) = key_override.filter(|k| !k.is_empty()) {
            (cols.to_vec(), KeyKind::Configured)
        } else if !source.primary_key.is_empty() {
            if source.primary_key != target.primary_key {
                return Err(ReconcileError::schema(
                    &table,
                    format!(
                        "primary key mismatch: source={:?}, target={:?}",
                        source.primary_key, target.primary_key
                    ),
                ));
            }
            (source.primary_key.clone(), KeyKind::PrimaryKey)
        } else if let Some(uk) = source
            .unique_keys
            .iter()
            .find(|uk| target.unique_keys.contains(uk))
        {
            (uk.clone(), KeyKind::UniqueConstraint)
        } else {
            (Vec::new(), KeyKind::AllColumns)
        };

        let mut notes = Vec::new();
        let ignored = IgnoredColumns(
            ignored
                .0
                .iter()
                .filter(|c| {
                    let is_key = key.contains(c);
                    if is_key {
                        notes.push(format!(
                            "column {} is part of the identifying key of {} and is compared despite being ignored",
                            c, table
                        ));
                    }
                    !is_key
                })
                .cloned()
                .collect(),
        );

        let source_cols: Vec<&str> = source
            .column_names()
            .filter(|c| !ignored.contains(c))
            .collect();
        let target_cols: Vec<&str> = target
            .column_names()
            .filter(|c| !ignored.contains(c))
            .collect();

        let missing: Vec<&str> = source_cols
            .iter()
            .filter(|c| !target_cols.contains(c))
            .copied()
            .collect();
        let extra: Vec<&str> = target_cols
            .iter()
            .filter(|c| !source_cols.contains(c))
            .copied()
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            let mut detail = String::from("columns differ (ignored columns excluded):");
            if !missing.is_empty() {
                detail.push_str(&format!(" missing in target: {:?}.", missing));
            }
            if !extra.is_empty() {
                detail.push_str(&format!(" extra in target: {:?}.", extra));
            }
            return Err(ReconcileError::schema(&table, detail));
        }

        let columns = source_cols.iter().map(|c| ColumnName::from(*c)).collect();
        let key_columns = key.iter().map(|c| ColumnName(c.clone())).collect();

        let mut spec = TableSpec::new(
            source_table,
            target_table,
            columns,
            key_columns,
            kind,
            ignored,
        )?;
        spec.warnings.extend(notes);
        Ok(spec)
    }

    /// `true` when rows can be addressed individually (fix statements,
    /// point lookups).
    pub fn has_identifying_key(&self) -> bool {
        self.key_kind != KeyKind::AllColumns
    }
}
