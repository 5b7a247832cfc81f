use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, instrument};

use crate::domain::cell::{Cell, RawRow};
use crate::domain::error::Result;
use crate::domain::ports::{QueryExecutor, SampleRequest};
use crate::domain::value_objects::{ColumnName, Side, TableName};

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// A single timed operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// "count_rows", "fetch_chunk", "fetch_sample", "fetch_row_by_key" or
    /// "reconcile".
    pub operation: &'static str,
    pub side: Option<Side>,
    pub table: String,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Rows returned (queries) or scanned on both sides (reconcile).
    pub rows: u64,
}

/// Accumulated performance timings for a single run.
///
/// Shared across all decorator instances for one run via `Arc<Mutex<_>>`.
/// After the run, pass to [`crate::presentation::cli_summary::print_perf_summary`]
/// to render a human-readable table.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub total_rows_fetched: u64,
    /// Time spent in database calls, both sides summed.
    pub total_query_ms: u128,
}

impl PerfReport {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn record(report: &Arc<Mutex<Self>>, timing: OpTiming) {
        if let Ok(mut r) = report.lock() {
            if timing.side.is_some() {
                r.total_query_ms += timing.duration_ms;
                r.total_rows_fetched += timing.rows;
            }
            r.timings.push(timing);
        }
    }

    /// Snapshot of the shared report.
    pub fn snapshot(report: &Arc<Mutex<Self>>) -> Self {
        report.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Per-table roll-up, in first-seen order.
    pub fn by_table(&self) -> Vec<TableTiming> {
        let mut out: Vec<TableTiming> = Vec::new();
        for t in &self.timings {
            let idx = match out.iter().position(|e| e.table == t.table) {
                Some(i) => i,
                None => {
                    out.push(TableTiming {
                        table: t.table.clone(),
                        ..Default::default()
                    });
                    out.len() - 1
                }
            };
            let entry = &mut out[idx];
            if t.side.is_some() {
                entry.queries += 1;
                entry.rows_fetched += t.rows;
                entry.query_ms += t.duration_ms;
            } else {
                entry.reconcile_ms += t.duration_ms;
            }
        }
        out
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TableTiming {
    pub table: String,
    pub queries: u64,
    pub rows_fetched: u64,
    pub query_ms: u128,
    pub reconcile_ms: u128,
}

// ─── MonitoringExecutor ──────────────────────────────────────────────────────

/// Decorator: wraps any `QueryExecutor`, measures wall time per call, and
/// appends the result to the shared `PerfReport`.
pub struct MonitoringExecutor {
    inner: Arc<dyn QueryExecutor>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringExecutor {
    pub fn new(inner: Arc<dyn QueryExecutor>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }

    fn record(&self, operation: &'static str, table: &TableName, start: Instant, rows: u64) {
        let duration_ms = start.elapsed().as_millis();
        debug!(side = %self.inner.side(), table = %table, rows, duration_ms, "{} completed", operation);
        PerfReport::record(
            &self.report,
            OpTiming {
                operation,
                side: Some(self.inner.side()),
                table: table.0.clone(),
                duration_ms,
                rows,
            },
        );
    }
}

#[async_trait]
impl QueryExecutor for MonitoringExecutor {
    fn side(&self) -> Side {
        self.inner.side()
    }

    #[instrument(
        name = "count_rows",
        skip(self, table),
        fields(db.side = %self.inner.side(), db.table = %table.0),
        level = "debug"
    )]
    async fn count_rows(&self, table: &TableName) -> Result<u64> {
        let start = Instant::now();
        let count = self.inner.count_rows(table).await?;
        self.record("count_rows", table, start, 0);
        Ok(count)
    }

    #[instrument(
        name = "fetch_chunk",
        skip(self, table, columns, order_by),
        fields(db.side = %self.inner.side(), db.table = %table.0),
        level = "debug"
    )]
    async fn fetch_chunk(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<RawRow>> {
        let start = Instant::now();
        let rows = self
            .inner
            .fetch_chunk(table, columns, order_by, offset, limit)
            .await?;
        self.record("fetch_chunk", table, start, rows.len() as u64);
        Ok(rows)
    }

    #[instrument(
        name = "fetch_sample",
        skip(self, table, columns, order_by),
        fields(db.side = %self.inner.side(), db.table = %table.0),
        level = "debug"
    )]
    async fn fetch_sample(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        order_by: &[ColumnName],
        sample: SampleRequest,
    ) -> Result<Vec<RawRow>> {
        let start = Instant::now();
        let rows = self
            .inner
            .fetch_sample(table, columns, order_by, sample)
            .await?;
        self.record("fetch_sample", table, start, rows.len() as u64);
        Ok(rows)
    }

    async fn fetch_row_by_key(
        &self,
        table: &TableName,
        columns: &[ColumnName],
        key: &[(String, Cell)],
    ) -> Result<Option<RawRow>> {
        let start = Instant::now();
        let row = self.inner.fetch_row_by_key(table, columns, key).await?;
        self.record("fetch_row_by_key", table, start, u64::from(row.is_some()));
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::{MemoryExecutor, MemoryTable};

    #[tokio::test]
    async fn records_every_call_with_rows() {
        let inner = MemoryExecutor::new(Side::Source).with_table(
            "t",
            MemoryTable::new(&["id"], &["id"])
                .with_rows((0..5).map(|i| [("id".to_string(), Cell::Int(i))].into())),
        );
        let report = PerfReport::new();
        let exec = MonitoringExecutor::new(Arc::new(inner), Arc::clone(&report));
        let table = TableName("t".into());
        let cols = vec![ColumnName::from("id")];

        assert_eq!(exec.count_rows(&table).await.unwrap(), 5);
        exec.fetch_chunk(&table, &cols, &cols, 0, 3).await.unwrap();
        exec.fetch_chunk(&table, &cols, &cols, 3, 3).await.unwrap();

        let perf = PerfReport::snapshot(&report);
        assert_eq!(perf.timings.len(), 3);
        assert_eq!(perf.total_rows_fetched, 5);
        let by_table = perf.by_table();
        assert_eq!(by_table.len(), 1);
        assert_eq!(by_table[0].queries, 3);
    }

    #[tokio::test]
    async fn failed_calls_are_not_recorded() {
        let report = PerfReport::new();
        let exec = MonitoringExecutor::new(Arc::new(MemoryExecutor::new(Side::Target)), Arc::clone(&report));
        assert!(exec.count_rows(&TableName("missing".into())).await.is_err());
        assert!(PerfReport::snapshot(&report).timings.is_empty());
    }
}
