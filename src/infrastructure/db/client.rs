use anyhow::Context;
use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::domain::cell::{Cell, RawRow};
use crate::domain::error::{ReconcileError, Result};
use crate::domain::ports::{QueryExecutor, SampleRequest, TableCatalog};
use crate::domain::table_spec::{ColumnDef, TableShape};
use crate::domain::value_objects::{ColumnName, Schema, Side, TableName};
use crate::infrastructure::config::DbConfig;
use crate::infrastructure::db::dialect::{from_driver, Dialect};
use crate::infrastructure::db::retry::{with_retry, RetryPolicy};
use crate::infrastructure::db::row_mapper::row_to_cells;
use crate::infrastructure::db::sql_utils::{
    build_chunk_query, build_count_query, build_key_lookup_query, build_sample_query,
    qualified_table, select_list,
};

type ColumnTypes = Arc<HashMap<String, String>>;

/// [`QueryExecutor`] and [`TableCatalog`] over one side's `sqlx::AnyPool`.
pub struct SqlxExecutor {
    pool: AnyPool,
    dialect: Arc<dyn Dialect>,
    schema: Schema,
    side: Side,
    retry: RetryPolicy,
    /// Catalog data types per table, read once per run.
    column_types: Mutex<HashMap<String, ColumnTypes>>,
}

/// Connect to the database described in `cfg` and return a `SqlxExecutor`.
pub async fn connect(cfg: &DbConfig, side: Side, retry: &RetryPolicy) -> anyhow::Result<SqlxExecutor> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(cfg.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
        .connect(&cfg.url())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {} {} (driver: {})",
                side, cfg.dbname, cfg.driver
            )
        })?;

    debug!(
        "Connected to {} {}/{} via {} driver",
        side, cfg.host, cfg.dbname, cfg.driver
    );

    Ok(SqlxExecutor {
        pool,
        dialect: Arc::from(from_driver(&cfg.driver)),
        schema: Schema(cfg.schema.clone()),
        side,
        retry: retry.clone(),
        column_types: Mutex::new(HashMap::new()),
    })
}

/// Classify a sqlx error: connectivity problems are transient, everything
/// else is a query failure.
pub fn map_sqlx_error(side: Side, context: &str, err: sqlx::Error) -> ReconcileError {
    let transient = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // SQLSTATE class 08: connection exception
        sqlx::Error::Database(db) => db.code().is_some_and(|c| c.starts_with("08")),
        _ => false,
    };
    if transient {
        ReconcileError::connection(side, context, err.to_string())
    } else {
        ReconcileError::query(side, context, err.to_string())
    }
}

/// Read a column from an AnyRow as String, handling MySQL's habit of returning
/// information_schema string columns as BLOB to sqlx AnyRow.
fn blob_or_string(row: &AnyRow, idx: usize) -> std::result::Result<String, sqlx::Error> {
    use sqlx::{Column, Row, TypeInfo};
    let type_name = row.column(idx).type_info().name();
    if type_name == "BLOB" {
        let bytes: Vec<u8> = row.try_get(idx)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        row.try_get(idx)
    }
}

impl SqlxExecutor {
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn from_clause(&self, table: &TableName) -> String {
        qualified_table(&self.schema, table, self.dialect.as_ref())
    }

    /// Run `sql` with retry and return the raw rows.
    async fn fetch_raw(&self, sql: &str, context: &str) -> Result<Vec<AnyRow>> {
        debug!(side = %self.side, "Executing: {}", sql);
        let pool = &self.pool;
        let side = self.side;
        with_retry(&self.retry, context, move || async move {
            sqlx::query(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| map_sqlx_error(side, context, e))
        })
        .await
    }

    async fn fetch_cells(&self, sql: &str, types: &HashMap<String, String>, context: &str) -> Result<Vec<RawRow>> {
        let rows = self.fetch_raw(sql, context).await?;
        rows.iter()
            .map(|row| {
                row_to_cells(row, types, self.dialect.as_ref())
                    .map_err(|e| map_sqlx_error(self.side, context, e))
            })
            .collect()
    }

    /// Catalog query: binds the schema (where the dialect has schemas) and
    /// then the table name, if any.
    async fn catalog_rows(&self, sql: &str, table: Option<&str>, context: &str) -> Result<Vec<AnyRow>> {
        let pool = &self.pool;
        let side = self.side;
        let schema = self.dialect.has_schemas().then_some(self.schema.0.as_str());
        with_retry(&self.retry, context, move || async move {
            let mut query = sqlx::query(sql);
            if let Some(s) = schema {
                query = query.bind(s);
            }
            if let Some(t) = table {
                query = query.bind(t);
            }
            query
                .fetch_all(pool)
                .await
                .map_err(|e| map_sqlx_error(side, context, e))
        })
        .await
    }

    /// `(column_name, data_type)` pairs in ordinal order.
    async fn fetch_columns(&self, table: &TableName) -> Result<Vec<(String, String)>> {
        let context = format!("columns of {}", table);
        let rows = self
            .catalog_rows(self.dialect.columns_sql(), Some(&table.0), &context)
            .await?;
        rows.iter()
            .map(|row| -> std::result::Result<(String, String), sqlx::Error> {
                Ok((blob_or_string(row, 0)?, blob_or_string(row, 1)?))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(self.side, &context, e))
    }

    async fn column_types(&self, table: &TableName) -> Result<ColumnTypes> {
        if let Ok(cache) = self.column_types.lock() {
            if let Some(types) = cache.get(&table.0) {
                return Ok(Arc::clone(types));
            }
        }
        let types: ColumnTypes = Arc::new(self.fetch_columns(table).await?.into_iter().collect());
        if let Ok(mut cache) = self.column_types.lock() {
            cache.insert(table.0.clone(), Arc::clone(&types));
        }
        Ok(types)
    }
}

#[async_trait]
impl QueryExecutor for SqlxExecutor {
    fn side(&self) -> Side {
        self.side
    }

    async fn count_rows(&self, table: &TableName) -> Result<u64> {
        let sql = build_count_query(&self.from_clause(table));
        let context = format!("count {}", table);
        debug!(side = %self.side, "Executing: {}", sql);
        let pool = &self.pool;
        let side = self.side;
        let sql = sql.as_str();
        let ctx = context.as_str();
        let count: i64 = with_retry(&self.retry, ctx, move || async move {
            sqlx::query_scalar::<_, i64>(sql)
                .fetch_one(pool)
                .await
                .map_err(|e| map_sqlx_error(side, ctx, e))
        })
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_chunk(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<RawRow>> {
        let types = self.column_types(table).await?;
        let select = select_list(columns, &types, self.dialect.as_ref());
        let sql = build_chunk_query(
            &select,
            &self.from_clause(table),
            order_by,
            offset,
            limit,
            self.dialect.as_ref(),
        );
        self.fetch_cells(&sql, &types, &format!("chunk of {}", table))
            .await
    }

    async fn fetch_sample(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        sample: SampleRequest,
    ) -> Result<Vec<RawRow>> {
        let types = self.column_types(table).await?;
        let select = select_list(columns, &types, self.dialect.as_ref());
        let sql = build_sample_query(
            &select,
            columns,
            &self.from_clause(table),
            order_by,
            sample,
            self.dialect.as_ref(),
        );
        self.fetch_cells(&sql, &types, &format!("sample of {}", table))
            .await
    }

    async fn fetch_row_by_key(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        key: &[(String, Cell)],
    ) -> Result<Option<RawRow>> {
        let types = self.column_types(table).await?;
        let select = select_list(columns, &types, self.dialect.as_ref());
        let sql = build_key_lookup_query(&select, &self.from_clause(table), key, self.dialect.as_ref());
        let rows = self
            .fetch_cells(&sql, &types, &format!("lookup in {}", table))
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl TableCatalog for SqlxExecutor {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let context = format!("tables of {}", self.schema.0);
        let rows = self
            .catalog_rows(self.dialect.list_tables_sql(), None, &context)
            .await?;
        rows.iter()
            .map(|row| blob_or_string(row, 0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(self.side, &context, e))
    }

    async fn describe_table(&self, table: &TableName) -> Result<Option<TableShape>> {
        let columns = self.fetch_columns(table).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        if let Ok(mut cache) = self.column_types.lock() {
            cache.insert(table.0.clone(), Arc::new(columns.iter().cloned().collect()));
        }

        let context = format!("keys of {}", table);
        let rows = self
            .catalog_rows(self.dialect.key_constraints_sql(), Some(&table.0), &context)
            .await?;
        let mut constraints: Vec<(String, String, Vec<String>)> = Vec::new();
        for row in &rows {
            let read = |idx| blob_or_string(row, idx).map_err(|e| map_sqlx_error(self.side, &context, e));
            let (name, kind, column) = (read(0)?, read(1)?, read(2)?);
            match constraints.iter_mut().find(|(n, _, _)| *n == name) {
                Some((_, _, cols)) => cols.push(column),
                None => constraints.push((name, kind, vec![column])),
            }
        }

        let mut shape = TableShape {
            columns: columns
                .into_iter()
                .map(|(name, data_type)| ColumnDef { name, data_type })
                .collect(),
            ..Default::default()
        };
        for (_, kind, cols) in constraints {
            if kind.eq_ignore_ascii_case("PRIMARY KEY") {
                shape.primary_key = cols;
            } else {
                shape.unique_keys.push(cols);
            }
        }
        Ok(Some(shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        let err = map_sqlx_error(Side::Source, "count orders", sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(err.to_string().contains("count orders"));
    }

    #[test]
    fn missing_rows_error_is_a_query_failure() {
        let err = map_sqlx_error(Side::Target, "lookup", sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(matches!(err, ReconcileError::Query { side: Side::Target, .. }));
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(map_sqlx_error(Side::Source, "chunk", sqlx::Error::Io(io)).is_transient());
    }
}
