use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{Row, TypeInfo, ValueRef};

use crate::domain::cell::Cell;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// SQL dialect: query building and literal formatting.
///
/// Implemented per driver. Used by the infrastructure query builders and by
/// fix statement rendering. The interface is pure string manipulation with
/// no sqlx dependency.
pub trait QueryDialect: Send + Sync {
    /// Driver name as a lowercase string ("postgres", "mysql", …).
    /// Used for output metadata only, never for branching logic.
    fn name(&self) -> &'static str;

    /// `true` when tables live in a named schema that catalog queries bind as
    /// their first parameter. SQLite has none.
    fn has_schemas(&self) -> bool {
        true
    }

    /// Quote an identifier (table, column, schema) per dialect.
    /// - MySQL / MariaDB → backtick: `` `col` ``
    /// - PostgreSQL / SQLite → double-quote: `"col"`
    fn quote_ident(&self, s: &str) -> String;

    /// Return the `schema.` prefix for a qualified table reference.
    /// SQLite has no schema namespace, so it returns `""`.
    fn schema_prefix(&self, schema: &str) -> String {
        format!("{}.", self.quote_ident(schema))
    }

    /// Produce the cast expression that coerces an unsupported column type to
    /// a string readable by `sqlx::AnyRow`.
    /// - PostgreSQL  : `"col"::TEXT AS "col"`
    /// - MySQL/MariaDB : `CONVERT(\`col\` USING utf8mb4) AS \`col\``
    fn cast_to_text(&self, col_quoted: &str) -> String;

    /// Return `true` if `data_type` (a catalog type name) is natively
    /// decodable by `sqlx::AnyRow` without any explicit cast.
    fn is_native_type(&self, data_type: &str) -> bool;

    /// Random ordering function used by random sampling.
    fn random_fn(&self) -> &'static str {
        "RANDOM()"
    }

    /// Base tables of a schema, one name per row.
    fn list_tables_sql(&self) -> &'static str;

    /// `(column_name, data_type)` rows in ordinal order.
    fn columns_sql(&self) -> &'static str;

    /// `(constraint_name, constraint_type, column_name)` rows for the primary
    /// key and unique constraints, ordered by constraint then key position.
    fn key_constraints_sql(&self) -> &'static str;

    /// Format a cell as an SQL literal for this dialect.
    /// - NULL          → `NULL`
    /// - Bool          → `TRUE` / `FALSE`
    /// - Int / Decimal → bare number
    /// - Text / dates  → `'escaped'`
    /// - Json          → `'json'` with `::jsonb` cast on PostgreSQL only
    fn sql_literal(&self, val: &Cell) -> String {
        match val {
            Cell::Null => "NULL".to_string(),
            Cell::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) if f.is_finite() => f.to_string(),
            Cell::Float(f) => self.string_literal(&f.to_string()),
            Cell::Decimal(s) if is_plain_number(s) => s.trim().to_string(),
            Cell::Decimal(s) | Cell::Text(s) => self.string_literal(s),
            Cell::Date(d) => self.string_literal(&d.format("%Y-%m-%d").to_string()),
            Cell::Timestamp(ts) => {
                self.string_literal(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            Cell::TimestampTz(ts) => self.timestamptz_literal(ts),
            Cell::Json(v) => self.json_literal(&v.to_string()),
            Cell::Bytes(b) => self.bytes_literal(b),
        }
    }

    /// Quote a string, doubling single quotes.
    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Render a serialised JSON document as a dialect-appropriate literal.
    /// Override in PostgreSQL to append `::jsonb`.
    fn json_literal(&self, json_str: &str) -> String {
        self.string_literal(json_str)
    }

    fn timestamptz_literal(&self, ts: &DateTime<Utc>) -> String {
        self.string_literal(&ts.format("%Y-%m-%d %H:%M:%S%.f+00:00").to_string())
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex::encode(bytes))
    }
}

/// Row decoder: read a single `AnyRow` column into a [`Cell`].
///
/// Implemented per driver. Lives in infrastructure only: callers outside
/// this module receive cells, never raw `AnyRow`s.
pub trait RowDecoder: Send + Sync {
    /// Decode the column at `idx` using `type_hint` (the catalog data type)
    /// to reconstruct the right [`Cell`] variant.
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Cell, sqlx::Error>;
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ─────────────────────────────────────────────────────────────────────────────

pub struct PostgresDialect;

impl QueryDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        format!("{}::TEXT AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "boolean" | "smallint" | "integer" | "bigint" | "real" | "double precision"
        )
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT table_name::TEXT \
         FROM information_schema.tables \
         WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT column_name::TEXT, data_type::TEXT \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position"
    }

    fn key_constraints_sql(&self) -> &'static str {
        "SELECT tc.constraint_name::TEXT, tc.constraint_type::TEXT, kcu.column_name::TEXT \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name \
          AND tc.table_schema = kcu.table_schema \
          AND tc.table_name = kcu.table_name \
         WHERE tc.table_schema = $1 AND tc.table_name = $2 \
           AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
         ORDER BY tc.constraint_name, kcu.ordinal_position"
    }

    fn json_literal(&self, json_str: &str) -> String {
        format!("{}::jsonb", self.string_literal(json_str))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", hex::encode(bytes))
    }
}

impl RowDecoder for PostgresDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Cell, sqlx::Error> {
        decode_any(row, idx, type_hint, false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MySQL / MariaDB
// ─────────────────────────────────────────────────────────────────────────────

pub struct MysqlDialect;

impl QueryDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        // CAST(col AS CHAR) and CONVERT(col USING utf8mb4) both return BLOB
        // to sqlx AnyRow; the decoder reads those bytes back as UTF-8.
        format!("CONVERT({} USING utf8mb4) AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "int"
                | "mediumint"
                | "bigint"
                | "float"
                | "double"
                | "binary"
                | "varbinary"
                | "blob"
                | "tinyblob"
                | "mediumblob"
                | "longblob"
        )
    }

    fn random_fn(&self) -> &'static str {
        "RAND()"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT table_name \
         FROM information_schema.tables \
         WHERE table_schema = ? AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT column_name, data_type \
         FROM information_schema.columns \
         WHERE table_schema = ? AND table_name = ? \
         ORDER BY ordinal_position"
    }

    fn key_constraints_sql(&self) -> &'static str {
        "SELECT tc.constraint_name, tc.constraint_type, kcu.column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name \
          AND tc.table_schema = kcu.table_schema \
          AND tc.table_name = kcu.table_name \
         WHERE tc.table_schema = ? AND tc.table_name = ? \
           AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
         ORDER BY tc.constraint_name, kcu.ordinal_position"
    }

    /// Backslash is an escape character in MySQL string literals.
    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn timestamptz_literal(&self, ts: &DateTime<Utc>) -> String {
        // DATETIME/TIMESTAMP literals take no offset
        self.string_literal(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl RowDecoder for MysqlDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Cell, sqlx::Error> {
        // MySQL returns cast columns as BLOB regardless of the SQL cast.
        decode_any(row, idx, type_hint, true)
    }
}

// MariaDB shares MySQL's wire protocol and AnyRow behaviour.
pub struct MariadbDialect;

impl QueryDialect for MariadbDialect {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn quote_ident(&self, s: &str) -> String {
        MysqlDialect.quote_ident(s)
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        MysqlDialect.cast_to_text(col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        MysqlDialect.is_native_type(data_type)
    }

    fn random_fn(&self) -> &'static str {
        MysqlDialect.random_fn()
    }

    fn list_tables_sql(&self) -> &'static str {
        MysqlDialect.list_tables_sql()
    }

    fn columns_sql(&self) -> &'static str {
        MysqlDialect.columns_sql()
    }

    fn key_constraints_sql(&self) -> &'static str {
        MysqlDialect.key_constraints_sql()
    }

    fn string_literal(&self, s: &str) -> String {
        MysqlDialect.string_literal(s)
    }

    fn timestamptz_literal(&self, ts: &DateTime<Utc>) -> String {
        MysqlDialect.timestamptz_literal(ts)
    }
}

impl RowDecoder for MariadbDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Cell, sqlx::Error> {
        MysqlDialect.decode_column(row, idx, type_hint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

pub struct SqliteDialect;

impl QueryDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn has_schemas(&self) -> bool {
        false
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn schema_prefix(&self, _schema: &str) -> String {
        // SQLite has no schema namespace
        String::new()
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        format!("CAST({} AS TEXT) AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, _data_type: &str) -> bool {
        // Type affinity: every storage class decodes natively, the declared
        // type only steers interpretation.
        true
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT name, type FROM pragma_table_info(?1) ORDER BY cid"
    }

    fn key_constraints_sql(&self) -> &'static str {
        "SELECT 'primary' AS constraint_name, 'PRIMARY KEY' AS constraint_type, name AS column_name, pk AS pos \
         FROM pragma_table_info(?1) WHERE pk > 0 \
         UNION ALL \
         SELECT il.name, 'UNIQUE', ii.name, ii.seqno \
         FROM pragma_index_list(?1) AS il \
         JOIN pragma_index_info(il.name) AS ii \
         WHERE il.\"unique\" = 1 AND il.origin = 'u' \
         ORDER BY 1, 4"
    }
}

impl RowDecoder for SqliteDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<Cell, sqlx::Error> {
        decode_any(row, idx, type_hint, false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the dialect pair (QueryDialect + RowDecoder) from a driver name string.
/// Returns `Box<dyn Dialect>` where `Dialect` is the combined supertrait alias.
pub fn from_driver(driver: &str) -> Box<dyn Dialect> {
    match driver {
        "mysql" => Box::new(MysqlDialect),
        "mariadb" => Box::new(MariadbDialect),
        "sqlite" => Box::new(SqliteDialect),
        _ => Box::new(PostgresDialect),
    }
}

/// Combined supertrait, so callers only store one object.
pub trait Dialect: QueryDialect + RowDecoder {}
impl Dialect for PostgresDialect {}
impl Dialect for MysqlDialect {}
impl Dialect for MariadbDialect {}
impl Dialect for SqliteDialect {}

// ─────────────────────────────────────────────────────────────────────────────
// Shared decoding helpers (private to this module)
// ─────────────────────────────────────────────────────────────────────────────

/// `"DECIMAL(10,2)"` → `"DECIMAL"`, `"timestamp with time zone"` unchanged
/// apart from case.
fn base_type(type_hint: &str) -> String {
    let upper = type_hint.trim().to_uppercase();
    match upper.find('(') {
        Some(i) => upper[..i].trim().to_string(),
        None => upper,
    }
}

fn is_binary_type(t: &str) -> bool {
    matches!(
        t,
        "BYTEA" | "BLOB" | "BINARY" | "VARBINARY" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB"
    )
}

fn is_decimal_type(t: &str) -> bool {
    matches!(t, "NUMERIC" | "DECIMAL")
}

/// Decode by the runtime AnyRow kind first, then let the catalog type pick
/// the cell variant. `blob_is_text` marks drivers that deliver text casts as
/// BLOB.
fn decode_any(row: &AnyRow, idx: usize, type_hint: &str, blob_is_text: bool) -> Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let kind = raw.type_info().name().to_uppercase();
    let hint = base_type(type_hint);

    let cell = match kind.as_str() {
        "BOOLEAN" | "BOOL" => Cell::Bool(row.try_get::<bool, _>(idx)?),
        "SMALLINT" => int_cell(i64::from(row.try_get::<i16, _>(idx)?), &hint),
        "INTEGER" | "INT" => int_cell(i64::from(row.try_get::<i32, _>(idx)?), &hint),
        "BIGINT" => int_cell(row.try_get::<i64, _>(idx)?, &hint),
        "REAL" | "FLOAT" => float_cell(f64::from(row.try_get::<f32, _>(idx)?), &hint),
        "DOUBLE" | "DOUBLE PRECISION" => float_cell(row.try_get::<f64, _>(idx)?, &hint),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            if blob_is_text && !is_binary_type(&hint) {
                match String::from_utf8(bytes) {
                    Ok(s) => text_to_cell(s, &hint),
                    Err(e) => Cell::Bytes(e.into_bytes()),
                }
            } else {
                Cell::Bytes(bytes)
            }
        }
        _ => text_to_cell(row.try_get::<String, _>(idx)?, &hint),
    };
    Ok(cell)
}

fn int_cell(i: i64, hint: &str) -> Cell {
    match hint {
        "BOOL" | "BOOLEAN" => Cell::Bool(i != 0),
        t if is_decimal_type(t) => Cell::Decimal(i.to_string()),
        _ => Cell::Int(i),
    }
}

fn float_cell(f: f64, hint: &str) -> Cell {
    if is_decimal_type(hint) {
        Cell::Decimal(f.to_string())
    } else {
        Cell::Float(f)
    }
}

/// Reinterpret a text rendering (native text or a `::TEXT` cast) using the
/// catalog type. Values that fail to parse stay text, so nothing is lost.
fn text_to_cell(s: String, hint: &str) -> Cell {
    match hint {
        t if is_decimal_type(t) => Cell::Decimal(s),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            s.trim().parse::<i64>().map_or(Cell::Text(s), Cell::Int)
        }
        "BOOL" | "BOOLEAN" => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "1" => Cell::Bool(true),
            "f" | "false" | "0" => Cell::Bool(false),
            _ => Cell::Text(s),
        },
        "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => {
            s.trim().parse::<f64>().map_or(Cell::Text(s), Cell::Float)
        }
        "JSON" | "JSONB" => serde_json::from_str(&s).map_or(Cell::Text(s), Cell::Json),
        "DATE" => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_or(Cell::Text(s), Cell::Date),
        "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "DATETIME" => {
            parse_naive_timestamp(&s).map_or(Cell::Text(s), Cell::Timestamp)
        }
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => {
            parse_timestamptz(&s).map_or(Cell::Text(s), Cell::TimestampTz)
        }
        "BYTEA" => s
            .strip_prefix("\\x")
            .and_then(|h| hex::decode(h).ok())
            .map_or(Cell::Text(s), Cell::Bytes),
        _ => Cell::Text(s),
    }
}

fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

/// Optional sign, digits, optional fraction. Anything else is quoted.
fn is_plain_number(s: &str) -> bool {
    let s = s.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    !int.is_empty() && all_digits(int) && frac.map_or(true, |f| !f.is_empty() && all_digits(f))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
