use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::application::discovery::PlannedTable;
use crate::application::engine::{ReconciliationEngine, ValidationMethod};
use crate::application::fixgen::generate_fix_statements;
use crate::application::monitoring::{OpTiming, PerfReport};
use crate::application::stream::TaskBudget;
use crate::domain::error::ReconcileError;
use crate::domain::outcome::ReconciliationOutcome;
use crate::domain::report::{TableFixes, TableReport};

// ─── Run Service ───

/// Runs every planned table as its own task, at most `parallelism` at once.
///
/// A failing table never stops the others: its error is recorded in its
/// [`TableReport`] and the run goes on.
#[derive(Clone)]
pub struct RunService {
    engine: ReconciliationEngine,
    methods: Arc<Vec<ValidationMethod>>,
    parallelism: usize,
    table_timeout: Option<Duration>,
    collect_fixes: bool,
    perf: Option<Arc<Mutex<PerfReport>>>,
}

impl RunService {
    pub fn new(engine: ReconciliationEngine, methods: Vec<ValidationMethod>, parallelism: usize) -> Self {
        Self {
            engine,
            methods: Arc::new(methods),
            parallelism: parallelism.max(1),
            table_timeout: None,
            collect_fixes: false,
            perf: None,
        }
    }

    pub fn with_table_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.table_timeout = timeout;
        self
    }

    /// Produce fix statements from the first row-level outcome of each table.
    pub fn with_fixes(mut self, enabled: bool) -> Self {
        self.collect_fixes = enabled;
        self
    }

    pub fn with_perf(mut self, perf: Arc<Mutex<PerfReport>>) -> Self {
        self.perf = Some(perf);
        self
    }

    /// Reports come back in `planned` order, one per (table, method).
    pub async fn run_tables(
        &self,
        planned: Vec<PlannedTable>,
        cancel: &CancellationToken,
    ) -> (Vec<TableReport>, Vec<TableFixes>) {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut handles = Vec::with_capacity(planned.len());

        for table in planned {
            let names = (table.source.0.clone(), table.target.0.clone());
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.child_token();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed; a failed acquire only means
                // the run is shutting down.
                let _permit = semaphore.acquire_owned().await.ok();
                // The time budget starts once the table holds a permit.
                let budget = TaskBudget::new(&table.source.0, cancel, service.table_timeout);
                service.reconcile_table(table, budget).await
            });
            handles.push((names, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut fixes = Vec::new();
        for ((source, target), handle) in handles {
            match handle.await {
                Ok((table_reports, table_fixes)) => {
                    reports.extend(table_reports);
                    fixes.extend(table_fixes);
                }
                Err(e) => {
                    error!(table = %source, error = %e, "table task aborted");
                    let err = ReconcileError::Cancelled(source.clone());
                    for method in self.methods.iter() {
                        reports.push(TableReport::from_error(&source, &target, *method, &err, 0));
                    }
                }
            }
        }
        (reports, fixes)
    }

    #[instrument(name = "table", skip_all, fields(table = %planned.source))]
    async fn reconcile_table(
        &self,
        planned: PlannedTable,
        budget: TaskBudget,
    ) -> (Vec<TableReport>, Option<TableFixes>) {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(self.methods.len());
        let mut fixes: Option<TableFixes> = None;
        let mut rows_scanned = 0;

        for &method in self.methods.iter() {
            let method_start = Instant::now();
            let result = match &planned.spec {
                Ok(spec) => self.engine.run_with_budget(method, spec, &budget).await,
                Err(e) => Err(e.clone()),
            };
            let elapsed = method_start.elapsed().as_millis();

            match result {
                Ok(outcome) => {
                    rows_scanned += outcome.counts.source_scanned + outcome.counts.target_scanned;
                    let mut notes = Vec::new();
                    if self.collect_fixes && fixes.is_none() && method != ValidationMethod::RowCount {
                        let table_fixes = build_fixes(&outcome);
                        if let Some(reason) = &table_fixes.skipped {
                            notes.push(reason.clone());
                        }
                        fixes = Some(table_fixes);
                    }
                    let mut report = TableReport::from_outcome(method, outcome, elapsed);
                    report.notes.extend(notes);
                    reports.push(report);
                }
                Err(e) => {
                    warn!(table = %planned.source, method = %method, error = %e, "check failed");
                    reports.push(TableReport::from_error(
                        &planned.source.0,
                        &planned.target.0,
                        method,
                        &e,
                        elapsed,
                    ));
                }
            }
        }

        let duration_ms = started.elapsed().as_millis();
        info!(table = %planned.source, checks = reports.len(), duration_ms, "table done");
        if let Some(perf) = &self.perf {
            PerfReport::record(
                perf,
                OpTiming {
                    operation: "reconcile",
                    side: None,
                    table: planned.source.0.clone(),
                    duration_ms,
                    rows: rows_scanned,
                },
            );
        }
        (reports, fixes)
    }
}

fn build_fixes(outcome: &ReconciliationOutcome) -> TableFixes {
    let table = outcome.spec.source_table.0.clone();
    match generate_fix_statements(outcome) {
        Ok(statements) => TableFixes {
            table,
            statements,
            skipped: None,
        },
        Err(e) => TableFixes {
            table,
            statements: Vec::new(),
            skipped: Some(e.to_string()),
        },
    }
}
