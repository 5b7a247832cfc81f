//! # rowcheck: library usage example
//!
//! Shows three ways of consuming rowcheck as a Rust library:
//!
//! 1. **From a config file**: mirrors the CLI against real databases
//! 2. **In memory**: the whole run over `MemoryExecutor`s, no database needed
//! 3. **One table by hand**: drive the engine directly and render fixes
//!
//! Run with a config file:
//!   cargo run --example reconcile_in_memory -- rowcheck.toml
//!
//! Run the in-memory walkthrough:
//!   cargo run --example reconcile_in_memory

use std::sync::Arc;

use anyhow::Result;
use rowcheck::domain::table_spec::KeyKind;
use rowcheck::infrastructure::db::dialect::PostgresDialect;
use rowcheck::infrastructure::db::sql_utils::build_fix_statement;
use rowcheck::presentation::writers::writer_for;
use rowcheck::{
    generate_fix_statements, AppConfig, Cell, ColumnName, EngineSettings, IgnoredColumns,
    MemoryExecutor, MemoryTable, RawRow, ReconciliationEngine, RunReport, Side, TableName,
    TableSpec, TableStatus,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some(path) => from_config_file(path).await,
        None => {
            in_memory_run().await?;
            single_table().await
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 1: load config from a TOML file (same as the CLI does internally)
// ─────────────────────────────────────────────────────────────────────────────
async fn from_config_file(path: &str) -> Result<()> {
    println!("=== Pattern 1: from config file ({path}) ===\n");

    let cfg = AppConfig::load(Some(path))?;
    let report = rowcheck::run(&cfg).await?;
    print_report(&report);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 2: a full run over in-memory tables
// ─────────────────────────────────────────────────────────────────────────────
fn order(id: i64, amount: &str, status: &str) -> RawRow {
    [
        ("id".to_string(), Cell::Int(id)),
        ("amount".to_string(), Cell::decimal(amount)),
        ("status".to_string(), Cell::text(status)),
    ]
    .into()
}

fn sides() -> (MemoryExecutor, MemoryExecutor) {
    let orders = |rows: Vec<RawRow>| {
        MemoryTable::new(&["id", "amount", "status"], &["id"]).with_rows(rows)
    };
    let source = MemoryExecutor::new(Side::Source).with_table(
        "orders",
        orders(vec![
            order(1, "10.00", "paid"),
            order(2, "150.00", "paid"),
            order(3, "7.50", "new"),
        ]),
    );
    let target = MemoryExecutor::new(Side::Target).with_table(
        "orders",
        orders(vec![order(1, "10.00", "paid"), order(2, "150.0", "paid")]),
    );
    (source, target)
}

async fn in_memory_run() -> Result<()> {
    println!("=== Pattern 2: in-memory run ===\n");

    let cfg = AppConfig::from_toml_str(
        r#"
        [source]
        driver = "postgres"
        dbname = "legacy"

        [target]
        driver = "postgres"
        dbname = "warehouse"

        [fix]
        enabled = true
        "#,
    )?;

    let (source, target) = sides();
    let (report, perf) = rowcheck::reconcile_sides(
        &cfg,
        Arc::new(source),
        Arc::new(target),
        &[],
        &CancellationToken::new(),
    )
    .await?;

    print_report(&report);
    println!("{} row(s) fetched\n", perf.total_rows_fetched);

    // The fix file, exactly as the CLI would write it
    if let Some(sql) = writer_for("sql") {
        println!("{}", sql.format(&report)?);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 3: one table, engine driven directly
// ─────────────────────────────────────────────────────────────────────────────
async fn single_table() -> Result<()> {
    println!("=== Pattern 3: single table ===\n");

    let (source, target) = sides();
    let engine = ReconciliationEngine::new(
        Arc::new(source),
        Arc::new(target),
        Arc::new(EngineSettings {
            collect_fixes: true,
            ..Default::default()
        }),
    );

    let spec = TableSpec::new(
        TableName("orders".into()),
        TableName("orders".into()),
        vec![
            ColumnName::from("id"),
            ColumnName::from("amount"),
            ColumnName::from("status"),
        ],
        vec![ColumnName::from("id")],
        KeyKind::PrimaryKey,
        IgnoredColumns::default(),
    )?;

    let outcome = engine.reconcile(&spec).await?;
    for changed in &outcome.changed_rows {
        for diff in &changed.columns {
            println!(
                "  {} {}: {:?} → {:?}",
                changed.key, diff.column, diff.source, diff.target
            );
        }
    }
    for missing in &outcome.missing_in_target {
        println!("  {} missing in target", missing.key);
    }

    for stmt in generate_fix_statements(&outcome)? {
        println!("{}", build_fix_statement(&stmt, &PostgresDialect, "public"));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Run {}", report.run_id);
    for t in &report.tables {
        let status = match t.status {
            TableStatus::Pass => "pass",
            TableStatus::Fail => "FAIL",
            TableStatus::Error => "ERROR",
        };
        println!("  {:<20} {:<10} {}", t.table, t.method.to_string(), status);
    }
    let s = &report.summary;
    println!(
        "  {} checks: {} passed, {} failed, {} errored\n",
        s.checks, s.passed, s.failed, s.errored
    );
}
