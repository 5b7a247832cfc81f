use async_trait::async_trait;

use crate::domain::{
    cell::{Cell, RawRow},
    error::Result,
    report::RunReport,
    table_spec::TableShape,
    value_objects::{ColumnName, Side, TableName},
};

/// How a bounded sample is drawn from a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    /// Uniform random selection done by the database.
    #[default]
    Random,
    /// Every `stride`-th row of the key ordering.
    Systematic,
}

/// A bounded sample request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRequest {
    pub size: usize,
    pub method: SampleMethod,
    pub stride: u64,
}

/// Port: read access to one side's tables (implemented by SqlxExecutor and
/// MemoryExecutor).
///
/// Every row-returning call selects exactly `columns` and orders by
/// `order_by` ascending.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn side(&self) -> Side;

    async fn count_rows(&self, table: &TableName) -> Result<u64>;

    /// One page of rows, `offset` rows into the key ordering.
    async fn fetch_chunk(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<RawRow>>;

    /// At most `sample.size` rows, returned in key order.
    async fn fetch_sample(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        sample: SampleRequest,
    ) -> Result<Vec<RawRow>>;

    /// The row whose key columns equal `key`, if any.
    async fn fetch_row_by_key(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        key: &[(String, Cell)],
    ) -> Result<Option<RawRow>>;
}

/// Port: structural metadata of one side (feeds TableSpec discovery).
#[async_trait]
pub trait TableCatalog: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// `None` when the table does not exist.
    async fn describe_table(&self, table: &TableName) -> Result<Option<TableShape>>;
}

/// Port: output formatting (implemented by JsonWriter, SqlWriter)
pub trait OutputWriter: Send + Sync {
    /// Serializes the run report to a string (JSON, SQL, etc.)
    fn format(&self, report: &RunReport) -> anyhow::Result<String>;
    /// Extension of the produced file (e.g. "json", "sql")
    fn extension(&self) -> &'static str;
}
