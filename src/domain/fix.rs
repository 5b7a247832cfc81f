use serde::Serialize;

use crate::domain::cell::Cell;
use crate::domain::value_objects::TableName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixKind {
    Update,
    Insert,
}

impl std::fmt::Display for FixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixKind::Update => f.write_str("UPDATE"),
            FixKind::Insert => f.write_str("INSERT"),
        }
    }
}

/// One corrective statement for the target database.
///
/// `assignments` are the columns written (changed columns for an UPDATE, the
/// full row for an INSERT), always with source values. `key` is the WHERE
/// predicate and stays empty for inserts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixStatement {
    pub kind: FixKind,
    pub table: TableName,
    pub assignments: Vec<(String, Cell)>,
    pub key: Vec<(String, Cell)>,
}
