use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of rowcheck's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                          |
/// |---------|-----------------|--------------------------------------|
/// | `Error` | `error`         | `--quiet` / CI scripting             |
/// | `Info`  | `info`          | Default, shows per-table completions |
/// | `Debug` | `debug`         | `--verbose`, shows SQL queries too   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for rowcheck.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise.
/// Call this **once** at startup. Library consumers who manage their own
/// subscriber should skip it.
///
/// Only available with the `cli` feature (pulls in `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "rowcheck=error",
        LogLevel::Info => "rowcheck=info",
        LogLevel::Debug => "rowcheck=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::engine::{EngineSettings, ReconciliationEngine};
pub use application::fixgen::generate_fix_statements;
pub use application::monitoring::PerfReport;
pub use application::sampling::SamplingStrategy;
pub use domain::cell::{Cell, RawRow};
pub use domain::error::{ErrorKind, ReconcileError};
pub use domain::fix::{FixKind, FixStatement};
pub use domain::memory::{MemoryExecutor, MemoryTable};
pub use domain::outcome::{ReconciliationOutcome, ValidationMethod};
pub use domain::ports::{QueryExecutor, TableCatalog};
pub use domain::report::{Assurance, RunReport, RunSummary, TableReport, TableStatus};
pub use domain::table_spec::TableSpec;
pub use domain::value_objects::{ColumnName, IgnoredColumns, Side, TableName};
pub use infrastructure::config::{AppConfig, DbConfig, FixConfig, OutputConfig, ValidationConfig};

use crate::application::discovery::TableDiscovery;
use crate::application::monitoring::MonitoringExecutor;
use crate::application::run::RunService;
use crate::infrastructure::db::client::connect;

// ─── Public entry points ───

/// Reconcile every configured table.
///
/// Use [`run_with_timing`] if you also want a performance report.
pub async fn run(cfg: &AppConfig) -> Result<RunReport> {
    let (report, _) = run_with_timing(cfg).await?;
    Ok(report)
}

/// Reconcile every configured table and return a [`PerfReport`] with
/// per-table query and reconcile timings.
pub async fn run_with_timing(cfg: &AppConfig) -> Result<(RunReport, PerfReport)> {
    run_filtered(cfg, &[], &CancellationToken::new()).await
}

/// Like [`run_with_timing`], limited to `only` when non-empty. Cancelling
/// `cancel` stops every table at its next chunk boundary; the report still
/// comes back, with the interrupted tables marked as errors.
///
/// Failing to connect to either side aborts the run.
pub async fn run_filtered(
    cfg: &AppConfig,
    only: &[String],
    cancel: &CancellationToken,
) -> Result<(RunReport, PerfReport)> {
    let source = connect(&cfg.source, Side::Source, &cfg.retry)
        .await
        .context("Failed to connect to source database")?;
    let target = connect(&cfg.target, Side::Target, &cfg.retry)
        .await
        .context("Failed to connect to target database")?;

    reconcile_sides(cfg, Arc::new(source), Arc::new(target), only, cancel).await
}

/// Run the configured reconciliation over already-built executors.
///
/// This is the database-agnostic core of [`run_filtered`]; the connection
/// settings of `cfg` are only used to label the report.
pub async fn reconcile_sides<S, T>(
    cfg: &AppConfig,
    source: Arc<S>,
    target: Arc<T>,
    only: &[String],
    cancel: &CancellationToken,
) -> Result<(RunReport, PerfReport)>
where
    S: QueryExecutor + TableCatalog + 'static,
    T: QueryExecutor + TableCatalog + 'static,
{
    let perf = PerfReport::new();

    let discovery = TableDiscovery::new(source.clone(), target.clone());
    let planned = discovery
        .plan(&cfg.tables, &cfg.validation.ignored_columns, only)
        .await
        .context("Failed to list source tables")?;
    info!(tables = planned.len(), "reconciliation started");

    let source_exec = Arc::new(MonitoringExecutor::new(source, Arc::clone(&perf)));
    let target_exec = Arc::new(MonitoringExecutor::new(target, Arc::clone(&perf)));
    let settings = Arc::new(cfg.validation.engine_settings(cfg.fix.enabled));
    let engine = ReconciliationEngine::new(source_exec, target_exec, settings);

    let service = RunService::new(
        engine,
        cfg.validation.methods.clone(),
        cfg.validation.parallelism,
    )
    .with_table_timeout(cfg.validation.table_timeout_secs.map(Duration::from_secs))
    .with_fixes(cfg.fix.enabled)
    .with_perf(Arc::clone(&perf));

    let (tables, fixes) = service.run_tables(planned, cancel).await;
    let report = RunReport::new(
        &cfg.source.schema,
        &cfg.target.schema,
        &cfg.target.driver,
        tables,
        fixes,
    );
    info!(
        run_id = %report.run_id,
        passed = report.summary.passed,
        failed = report.summary.failed,
        errored = report.summary.errored,
        "reconciliation finished"
    );

    Ok((report, PerfReport::snapshot(&perf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [source]
        driver = "sqlite"
        dbname = "source.db"
        schema = "main"

        [target]
        driver = "sqlite"
        dbname = "target.db"
        schema = "main"

        [validation]
        methods = ["row_count", "hash"]

        [fix]
        enabled = true
    "#;

    fn row(id: i64, status: &str) -> RawRow {
        [
            ("id".to_string(), Cell::Int(id)),
            ("status".to_string(), Cell::text(status)),
        ]
        .into()
    }

    fn sides() -> (Arc<MemoryExecutor>, Arc<MemoryExecutor>) {
        let orders = |rows: Vec<RawRow>| MemoryTable::new(&["id", "status"], &["id"]).with_rows(rows);
        let source = MemoryExecutor::new(Side::Source)
            .with_table("orders", orders(vec![row(1, "paid"), row(2, "shipped"), row(3, "new")]))
            .with_table("customers", orders(vec![row(1, "a")]));
        let target = MemoryExecutor::new(Side::Target)
            .with_table("orders", orders(vec![row(1, "paid"), row(2, "pending")]))
            .with_table("customers", orders(vec![row(1, "a")]));
        (Arc::new(source), Arc::new(target))
    }

    #[tokio::test]
    async fn reconciles_all_discovered_tables_with_fixes_and_timings() {
        let cfg = AppConfig::from_toml_str(CONFIG).unwrap();
        let (source, target) = sides();
        let (report, perf) = reconcile_sides(&cfg, source, target, &[], &CancellationToken::new())
            .await
            .unwrap();

        // customers, orders; row_count + hash each
        assert_eq!(report.summary.checks, 4);
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.summary.rows_changed, 1);
        assert_eq!(report.summary.rows_missing_in_target, 1);
        assert_eq!(report.summary.fix_statements, 2);
        assert!(report.has_failures());
        assert_eq!(report.target_driver, "sqlite");
        assert!(perf.total_rows_fetched > 0);
    }

    #[tokio::test]
    async fn only_filter_limits_the_run() {
        let cfg = AppConfig::from_toml_str(CONFIG).unwrap();
        let (source, target) = sides();
        let (report, _) = reconcile_sides(
            &cfg,
            source,
            target,
            &["customers".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(report.tables.iter().all(|t| t.table == "customers"));
        assert!(!report.has_failures());
    }
}
