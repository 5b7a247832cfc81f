use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::cell::RawRow;
use crate::domain::error::{ReconcileError, Result};
use crate::domain::ports::{QueryExecutor, SampleRequest};
use crate::domain::value_objects::{ColumnName, TableName};

/// Cancellation and time budget of one table task, checked at chunk
/// boundaries only.
#[derive(Debug, Clone)]
pub struct TaskBudget {
    table: String,
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl TaskBudget {
    pub fn new(table: &str, cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            table: table.to_string(),
            cancel,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    /// No cancellation, no deadline.
    pub fn unbounded(table: &str) -> Self {
        Self::new(table, CancellationToken::new(), None)
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled(self.table.clone()));
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ReconcileError::Timeout {
                    table: self.table.clone(),
                    budget,
                });
            }
        }
        Ok(())
    }
}

enum Mode {
    Paged { offset: u64 },
    Sampled {
        request: SampleRequest,
        buffer: Option<VecDeque<RawRow>>,
    },
}

/// Lazy, single-pass reader of one side of a table, ordered by key.
///
/// Full scans page with LIMIT/OFFSET; sampled streams issue the sample query
/// once and hand the rows out chunk by chunk. Open a new stream for every
/// pass.
pub struct ChunkedRowStream<'a> {
    executor: &'a dyn QueryExecutor,
    table: TableName,
    columns: &'a [ColumnName],
    order_by: &'a [ColumnName],
    chunk_size: usize,
    budget: &'a TaskBudget,
    mode: Mode,
    done: bool,
}

impl<'a> ChunkedRowStream<'a> {
    pub fn full_scan(
        executor: &'a dyn QueryExecutor,
        table: TableName,
        columns: &'a [ColumnName],
        order_by: &'a [ColumnName],
        chunk_size: usize,
        budget: &'a TaskBudget,
    ) -> Self {
        Self {
            executor,
            table,
            columns,
            order_by,
            chunk_size: chunk_size.max(1),
            budget,
            mode: Mode::Paged { offset: 0 },
            done: false,
        }
    }

    pub fn sampled(
        executor: &'a dyn QueryExecutor,
        table: TableName,
        columns: &'a [ColumnName],
        order_by: &'a [ColumnName],
        chunk_size: usize,
        budget: &'a TaskBudget,
        request: SampleRequest,
    ) -> Self {
        Self {
            mode: Mode::Sampled {
                request,
                buffer: None,
            },
            ..Self::full_scan(executor, table, columns, order_by, chunk_size, budget)
        }
    }

    /// Next chunk of rows, or `None` once the stream is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<RawRow>>> {
        if self.done {
            return Ok(None);
        }
        self.budget.check()?;

        match &mut self.mode {
            Mode::Paged { offset } => {
                let rows = self
                    .executor
                    .fetch_chunk(&self.table, self.columns, self.order_by, *offset, self.chunk_size)
                    .await?;
                if rows.len() < self.chunk_size {
                    self.done = true;
                }
                if rows.is_empty() {
                    return Ok(None);
                }
                *offset += rows.len() as u64;
                debug!(table = %self.table, side = %self.executor.side(), offset = *offset, "chunk read");
                Ok(Some(rows))
            }
            Mode::Sampled { request, buffer } => {
                if buffer.is_none() {
                    let rows = self
                        .executor
                        .fetch_sample(&self.table, self.columns, self.order_by, *request)
                        .await?;
                    debug!(table = %self.table, side = %self.executor.side(), rows = rows.len(), "sample read");
                    *buffer = Some(rows.into_iter().take(request.size).collect());
                }
                let Some(buf) = buffer.as_mut() else {
                    return Ok(None);
                };
                if buf.is_empty() {
                    self.done = true;
                    return Ok(None);
                }
                let n = self.chunk_size.min(buf.len());
                Ok(Some(buf.drain(..n).collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::Cell;
    use crate::domain::memory::{MemoryExecutor, MemoryTable};
    use crate::domain::ports::SampleMethod;
    use crate::domain::value_objects::Side;

    fn executor(rows: i64) -> MemoryExecutor {
        MemoryExecutor::new(Side::Source).with_table(
            "t",
            MemoryTable::new(&["id"], &["id"])
                .with_rows((0..rows).map(|i| [("id".to_string(), Cell::Int(i))].into())),
        )
    }

    #[tokio::test]
    async fn full_scan_reads_every_row_once() {
        let ex = executor(10);
        let cols = vec![ColumnName::from("id")];
        let budget = TaskBudget::unbounded("t");
        let mut stream =
            ChunkedRowStream::full_scan(&ex, TableName("t".into()), &cols, &cols, 4, &budget);
        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sampled_stream_never_exceeds_sample_size() {
        let ex = executor(100);
        let cols = vec![ColumnName::from("id")];
        let budget = TaskBudget::unbounded("t");
        let request = SampleRequest {
            size: 7,
            method: SampleMethod::Random,
            stride: 15,
        };
        let mut stream = ChunkedRowStream::sampled(
            &ex,
            TableName("t".into()),
            &cols,
            &cols,
            3,
            &budget,
            request,
        );
        let mut total = 0;
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            assert!(chunk.len() <= 3);
            total += chunk.len();
        }
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn cancelled_budget_stops_at_chunk_boundary() {
        let ex = executor(10);
        let cols = vec![ColumnName::from("id")];
        let token = CancellationToken::new();
        let budget = TaskBudget::new("t", token.clone(), None);
        let mut stream =
            ChunkedRowStream::full_scan(&ex, TableName("t".into()), &cols, &cols, 4, &budget);
        assert!(stream.next_chunk().await.unwrap().is_some());
        token.cancel();
        let err = stream.next_chunk().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled(_)));
    }

    #[tokio::test]
    async fn expired_deadline_is_a_timeout() {
        let budget = TaskBudget::new("t", CancellationToken::new(), Some(Duration::ZERO));
        assert!(matches!(budget.check(), Err(ReconcileError::Timeout { .. })));
    }

    #[tokio::test]
    async fn sub_second_budget_is_reported_in_millis() {
        let budget = TaskBudget::new("orders", CancellationToken::new(), Some(Duration::from_millis(300)));
        tokio::time::sleep(Duration::from_millis(320)).await;
        let err = budget.check().unwrap_err();
        assert!(matches!(
            &err,
            ReconcileError::Timeout { budget, .. } if *budget == Duration::from_millis(300)
        ));
        assert_eq!(
            err.to_string(),
            "reconciliation of orders exceeded its 300ms budget"
        );
    }
}
