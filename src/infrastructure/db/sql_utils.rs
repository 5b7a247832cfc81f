use std::collections::HashMap;

use crate::domain::cell::Cell;
use crate::domain::fix::{FixKind, FixStatement};
use crate::domain::ports::{SampleMethod, SampleRequest};
use crate::domain::value_objects::{ColumnName, Schema, TableName};
use crate::infrastructure::db::dialect::QueryDialect;

/// Internal row number column of systematic samples. Never selected out.
const ROW_NUMBER_ALIAS: &str = "__rowcheck_rn";

// ─────────────────────────────────────────────────────────────────────────────
// Fragments
// ─────────────────────────────────────────────────────────────────────────────

/// `"schema"."table"`, or just `"table"` where the dialect has no schemas.
pub fn qualified_table(schema: &Schema, table: &TableName, dialect: &dyn QueryDialect) -> String {
    format!(
        "{}{}",
        dialect.schema_prefix(&schema.0),
        dialect.quote_ident(&table.0)
    )
}

/// Column list where every column whose catalog type is not natively
/// supported by `sqlx::AnyRow` is wrapped in the dialect cast expression
/// (`::TEXT` for PostgreSQL, `CONVERT(… USING utf8mb4)` for MySQL).
///
/// Columns absent from `col_types` are selected as-is.
pub fn select_list(
    columns: &[ColumnName],
    col_types: &HashMap<String, String>,
    dialect: &dyn QueryDialect,
) -> String {
    columns
        .iter()
        .map(|col| {
            let q = dialect.quote_ident(&col.0);
            match col_types.get(&col.0) {
                Some(data_type) if !dialect.is_native_type(data_type) => dialect.cast_to_text(&q),
                _ => q,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_clause(order_by: &[ColumnName], dialect: &dyn QueryDialect) -> String {
    if order_by.is_empty() {
        return String::new();
    }
    let cols: Vec<String> = order_by.iter().map(|c| dialect.quote_ident(&c.0)).collect();
    format!(" ORDER BY {}", cols.join(", "))
}

// ─────────────────────────────────────────────────────────────────────────────
// Query builders
// ─────────────────────────────────────────────────────────────────────────────

pub fn build_count_query(from: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", from)
}

/// One page of the key ordering. `ORDER BY` is omitted when `order_by` is
/// empty to avoid a SQL syntax error.
pub fn build_chunk_query(
    select: &str,
    from: &str,
    order_by: &[ColumnName],
    offset: u64,
    limit: usize,
    dialect: &dyn QueryDialect,
) -> String {
    format!(
        "SELECT {} FROM {}{} LIMIT {} OFFSET {}",
        select,
        from,
        order_clause(order_by, dialect),
        limit,
        offset
    )
}

/// At most `request.size` rows, returned in key order.
///
/// - Random: the database shuffles and truncates, the outer query restores
///   key order.
/// - Systematic: every `stride`-th row of the key ordering, starting with
///   the first.
pub fn build_sample_query(
    select: &str,
    columns: &[ColumnName],
    from: &str,
    order_by: &[ColumnName],
    request: SampleRequest,
    dialect: &dyn QueryDialect,
) -> String {
    match request.method {
        SampleMethod::Random => format!(
            "SELECT * FROM (SELECT {} FROM {} ORDER BY {} LIMIT {}) AS s{}",
            select,
            from,
            dialect.random_fn(),
            request.size,
            order_clause(order_by, dialect)
        ),
        SampleMethod::Systematic => {
            let outer: Vec<String> = columns.iter().map(|c| dialect.quote_ident(&c.0)).collect();
            let rn = dialect.quote_ident(ROW_NUMBER_ALIAS);
            format!(
                "SELECT {} FROM (SELECT {}, ROW_NUMBER() OVER ({}) AS {} FROM {}) AS s \
                 WHERE ({} - 1) % {} = 0 ORDER BY {} LIMIT {}",
                outer.join(", "),
                select,
                order_clause(order_by, dialect).trim_start(),
                rn,
                from,
                rn,
                request.stride.max(1),
                rn,
                request.size
            )
        }
    }
}

/// `col = literal AND ...`, with `IS NULL` for NULL key parts.
fn key_predicate(key: &[(String, Cell)], dialect: &dyn QueryDialect) -> String {
    key.iter()
        .map(|(col, val)| {
            let col_q = dialect.quote_ident(col);
            if val.is_null() {
                format!("{} IS NULL", col_q)
            } else {
                format!("{} = {}", col_q, dialect.sql_literal(val))
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Render a fix statement for `dialect`, qualifying the table with `schema`.
pub fn build_fix_statement(stmt: &FixStatement, dialect: &dyn QueryDialect, schema: &str) -> String {
    let table = format!(
        "{}{}",
        dialect.schema_prefix(schema),
        dialect.quote_ident(&stmt.table.0)
    );
    match stmt.kind {
        FixKind::Update => {
            let set = stmt
                .assignments
                .iter()
                .map(|(col, val)| format!("{} = {}", dialect.quote_ident(col), dialect.sql_literal(val)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "UPDATE {} SET {} WHERE {};",
                table,
                set,
                key_predicate(&stmt.key, dialect)
            )
        }
        FixKind::Insert => {
            let cols: Vec<String> = stmt.assignments.iter().map(|(c, _)| dialect.quote_ident(c)).collect();
            let vals: Vec<String> = stmt.assignments.iter().map(|(_, v)| dialect.sql_literal(v)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({});",
                table,
                cols.join(", "),
                vals.join(", ")
            )
        }
    }
}

/// Point lookup of one row by its key values.
pub fn build_key_lookup_query(
    select: &str,
    from: &str,
    key: &[(String, Cell)],
    dialect: &dyn QueryDialect,
) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} LIMIT 1",
        select,
        from,
        key_predicate(key, dialect)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
