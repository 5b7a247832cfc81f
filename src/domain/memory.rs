use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::canonical::{normalize, NormalizationRules};
use crate::domain::cell::{Cell, RawRow};
use crate::domain::error::{ReconcileError, Result};
use crate::domain::ports::{QueryExecutor, SampleMethod, SampleRequest, TableCatalog};
use crate::domain::table_spec::{ColumnDef, TableShape};
use crate::domain::value_objects::{ColumnName, Side, TableName};

/// Seed of random samples; a fixed seed keeps samples reproducible.
const SAMPLE_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// One table held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub shape: TableShape,
    pub rows: Vec<RawRow>,
}

impl MemoryTable {
    /// Table with untyped columns and the given primary key.
    pub fn new(columns: &[&str], primary_key: &[&str]) -> Self {
        Self {
            shape: TableShape {
                columns: columns
                    .iter()
                    .map(|c| ColumnDef {
                        name: c.to_string(),
                        data_type: "text".into(),
                    })
                    .collect(),
                primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
                unique_keys: Vec::new(),
            },
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = RawRow>) -> Self {
        self.rows.extend(rows);
        self
    }
}

/// In-memory implementation of [`QueryExecutor`] and [`TableCatalog`].
///
/// Behaves like a database side for the engine: ordered paging, bounded
/// samples and point lookups. Random samples are drawn with a fixed-seed
/// generator so runs are reproducible.
pub struct MemoryExecutor {
    side: Side,
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryExecutor {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, name: &str, table: MemoryTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    fn table(&self, table: &TableName) -> Result<&MemoryTable> {
        self.tables
            .get(&table.0)
            .ok_or_else(|| ReconcileError::TableNotFound {
                table: table.0.clone(),
                side: self.side,
            })
    }

    fn sorted(&self, table: &TableName, order_by: &[ColumnName]) -> Result<Vec<&RawRow>> {
        let mut rows: Vec<&RawRow> = self.table(table)?.rows.iter().collect();
        rows.sort_by(|a, b| compare_rows(a, b, order_by));
        Ok(rows)
    }
}

fn project(row: &RawRow, columns: &[ColumnName]) -> RawRow {
    columns
        .iter()
        .filter_map(|c| row.get(&c.0).map(|v| (c.0.clone(), v.clone())))
        .collect()
}

fn compare_cells(a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (Cell::Null, Cell::Null) => Ordering::Equal,
        (Cell::Null, _) => Ordering::Less,
        (_, Cell::Null) => Ordering::Greater,
        (Cell::Int(x), Cell::Int(y)) => x.cmp(y),
        (Cell::Float(x), Cell::Float(y)) => x.total_cmp(y),
        _ => {
            let rules = NormalizationRules::default();
            normalize(a, &rules).cmp(&normalize(b, &rules))
        }
    }
}

fn compare_rows(a: &RawRow, b: &RawRow, order_by: &[ColumnName]) -> Ordering {
    for col in order_by {
        let ord = compare_cells(
            a.get(&col.0).unwrap_or(&Cell::Null),
            b.get(&col.0).unwrap_or(&Cell::Null),
        );
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}


#[async_trait]
impl QueryExecutor for MemoryExecutor {
    fn side(&self) -> Side {
        self.side
    }

    async fn count_rows(&self, table: &TableName) -> Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn fetch_chunk(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<RawRow>> {
        Ok(self
            .sorted(table, order_by)?
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .map(|r| project(r, columns))
            .collect())
    }

    async fn fetch_sample(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        sample: SampleRequest,
    ) -> Result<Vec<RawRow>> {
        let rows = self.sorted(table, order_by)?;
        let picked: Vec<&RawRow> = match sample.method {
            SampleMethod::Systematic => rows
                .into_iter()
                .step_by(sample.stride.max(1) as usize)
                .take(sample.size)
                .collect(),
            SampleMethod::Random => {
                let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
                let amount = sample.size.min(rows.len());
                let mut indices = index::sample(&mut rng, rows.len(), amount).into_vec();
                indices.sort_unstable();
                indices.into_iter().map(|i| rows[i]).collect()
            }
        };
        Ok(picked.into_iter().map(|r| project(r, columns)).collect())
    }

    async fn fetch_row_by_key(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        key: &[(String, Cell)],
    ) -> Result<Option<RawRow>> {
        Ok(self
            .table(table)?
            .rows
            .iter()
            .find(|row| {
                key.iter().all(|(col, val)| {
                    compare_cells(row.get(col).unwrap_or(&Cell::Null), val) == Ordering::Equal
                })
            })
            .map(|r| project(r, columns)))
    }
}

#[async_trait]
impl TableCatalog for MemoryExecutor {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_table(&self, table: &TableName) -> Result<Option<TableShape>> {
        Ok(self.tables.get(&table.0).map(|t| t.shape.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str) -> RawRow {
        [
            ("id".to_string(), Cell::Int(id)),
            ("name".to_string(), Cell::text(name)),
        ]
        .into()
    }

    fn executor() -> MemoryExecutor {
        MemoryExecutor::new(Side::Source).with_table(
            "users",
            MemoryTable::new(&["id", "name"], &["id"])
                .with_rows((1..=10).rev().map(|i| row(i, &format!("u{i}")))),
        )
    }

    fn cols() -> Vec<ColumnName> {
        vec![ColumnName::from("id"), ColumnName::from("name")]
    }

    #[tokio::test]
    async fn chunks_are_ordered_by_key() {
        let ex = executor();
        let t = TableName("users".into());
        let page = ex
            .fetch_chunk(&t, &cols(), &[ColumnName::from("id")], 2, 3)
            .await
            .unwrap();
        let ids: Vec<&Cell> = page.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&Cell::Int(3), &Cell::Int(4), &Cell::Int(5)]);
    }

    #[tokio::test]
    async fn samples_respect_size_and_order() {
        let ex = executor();
        let t = TableName("users".into());
        for method in [SampleMethod::Random, SampleMethod::Systematic] {
            let rows = ex
                .fetch_sample(
                    &t,
                    &cols(),
                    &[ColumnName::from("id")],
                    SampleRequest {
                        size: 4,
                        method,
                        stride: 3,
                    },
                )
                .await
                .unwrap();
            assert!(rows.len() <= 4);
            let ids: Vec<i64> = rows
                .iter()
                .filter_map(|r| match r["id"] {
                    Cell::Int(i) => Some(i),
                    _ => None,
                })
                .collect();
            let mut sorted = ids.clone();
            sorted.sort();
            assert_eq!(ids, sorted, "{method:?}");
        }
    }

    #[tokio::test]
    async fn random_samples_are_reproducible() {
        let ex = executor();
        let t = TableName("users".into());
        let request = SampleRequest {
            size: 4,
            method: SampleMethod::Random,
            stride: 3,
        };
        let id = [ColumnName::from("id")];
        let first = ex.fetch_sample(&t, &cols(), &id, request).await.unwrap();
        let second = ex.fetch_sample(&t, &cols(), &id, request).await.unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);

        let all = ex
            .fetch_sample(&t, &cols(), &id, SampleRequest { size: 50, ..request })
            .await
            .unwrap();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn missing_table_is_reported_with_side() {
        let ex = executor();
        let err = ex.count_rows(&TableName("nope".into())).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::TableNotFound {
                side: Side::Source,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn point_lookup_by_key() {
        let ex = executor();
        let t = TableName("users".into());
        let found = ex
            .fetch_row_by_key(&t, &cols(), &[("id".into(), Cell::Int(7))])
            .await
            .unwrap();
        assert_eq!(found.map(|r| r["name"].clone()), Some(Cell::text("u7")));
    }
}
