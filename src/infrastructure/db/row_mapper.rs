use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};
use std::collections::HashMap;

use crate::domain::cell::RawRow;
use crate::infrastructure::db::dialect::RowDecoder;

/// Convert a sqlx `AnyRow` into a [`RawRow`].
///
/// `col_types` maps column names to their catalog data types. `decoder` is
/// the dialect-specific `RowDecoder` that turns an AnyRow column index and
/// type hint into the right cell variant.
pub fn row_to_cells(
    row: &AnyRow,
    col_types: &HashMap<String, String>,
    decoder: &dyn RowDecoder,
) -> Result<RawRow, sqlx::Error> {
    let mut map = RawRow::new();
    for col in row.columns() {
        let name = col.name().to_string();
        // The catalog type is more precise than AnyRow's runtime type name;
        // the latter only covers columns the catalog did not report.
        let type_hint = col_types
            .get(&name)
            .map(|s| s.as_str())
            .unwrap_or_else(|| col.type_info().name());

        let value = decoder.decode_column(row, col.ordinal(), type_hint)?;
        map.insert(name, value);
    }
    Ok(map)
}
