use crate::application::monitoring::PerfReport;
use crate::domain::report::{Assurance, RunReport, TableReport, TableStatus};
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct CheckRow {
    table: String,
    method: String,
    assurance: String,
    matched: String,
    changed: String,
    #[tabled(rename = "missing in target")]
    missing_in_target: String,
    #[tabled(rename = "missing in source")]
    missing_in_source: String,
    status: String,
}

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

fn status_label(status: TableStatus) -> String {
    match status {
        TableStatus::Pass => "PASS".green().bold().to_string(),
        TableStatus::Fail => "FAIL".red().bold().to_string(),
        TableStatus::Error => "ERROR".magenta().bold().to_string(),
    }
}

fn assurance_label(assurance: Option<Assurance>) -> String {
    match assurance {
        Some(Assurance::Exhaustive) => "exhaustive".to_string(),
        Some(Assurance::Statistical) => "statistical".yellow().to_string(),
        Some(Assurance::CountOnly) => "count only".dimmed().to_string(),
        Some(Assurance::Checksum) => "checksum".to_string(),
        None => "-".dimmed().to_string(),
    }
}

fn count(n: u64, color: Color) -> String {
    if n == 0 {
        "0".dimmed().to_string()
    } else {
        n.to_string().color(color).to_string()
    }
}

fn check_row(t: &TableReport) -> CheckRow {
    let table = if t.table == t.target_table {
        t.table.bold().to_string()
    } else {
        format!("{} → {}", t.table.bold(), t.target_table)
    };
    match &t.outcome {
        Some(o) => {
            let missing_in_source = if o.missing_in_source_checked {
                count(o.counts.missing_in_source, Color::Red)
            } else {
                "n/a".dimmed().to_string()
            };
            CheckRow {
                table,
                method: t.method.to_string(),
                assurance: assurance_label(t.assurance),
                matched: o.counts.matched.to_string(),
                changed: count(o.counts.changed, Color::Yellow),
                missing_in_target: count(o.counts.missing_in_target, Color::Red),
                missing_in_source,
                status: status_label(t.status),
            }
        }
        None => CheckRow {
            table,
            method: t.method.to_string(),
            assurance: assurance_label(None),
            matched: "-".into(),
            changed: "-".into(),
            missing_in_target: "-".into(),
            missing_in_source: "-".into(),
            status: status_label(t.status),
        },
    }
}

pub fn print_summary(report: &RunReport) {
    println!();

    println!("{}", "ROWCHECK RECONCILIATION SUMMARY".bold().cyan());
    println!(
        "{} → {} ({})",
        report.source_schema.blue(),
        report.target_schema.green(),
        report.target_driver
    );
    println!("Run: {}", report.run_id.bright_yellow());
    println!();

    if report.tables.is_empty() {
        println!("{}", "No tables selected.".italic());
        return;
    }

    let rows: Vec<CheckRow> = report.tables.iter().map(check_row).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..=6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    // Errors and notes that don't fit in a table cell
    for t in &report.tables {
        if let Some(err) = &t.error {
            println!("  {} {} [{}]: {}", "✗".red(), t.table.bold(), t.method, err.message);
        }
        for note in &t.notes {
            println!("  {} {} [{}]: {}", "!".yellow(), t.table.bold(), t.method, note);
        }
    }

    let s = &report.summary;
    let summary_rows = vec![
        SummaryRow {
            metric: "Checks".into(),
            value: s.checks.to_string().bold().to_string(),
        },
        SummaryRow {
            metric: "Passed".into(),
            value: format!("{} ({:.2}%)", s.passed, s.pass_pct).green().to_string(),
        },
        SummaryRow {
            metric: "Failed".into(),
            value: format!("{} ({:.2}%)", s.failed, s.fail_pct).red().to_string(),
        },
        SummaryRow {
            metric: "Errored".into(),
            value: format!("{} ({:.2}%)", s.errored, s.error_pct).magenta().to_string(),
        },
        SummaryRow {
            metric: "Rows changed".into(),
            value: s.rows_changed.to_string().yellow().to_string(),
        },
        SummaryRow {
            metric: "Rows missing in target".into(),
            value: s.rows_missing_in_target.to_string().red().to_string(),
        },
        SummaryRow {
            metric: "Rows missing in source".into(),
            value: s.rows_missing_in_source.to_string().red().to_string(),
        },
        SummaryRow {
            metric: "Fix statements".into(),
            value: s.fix_statements.to_string(),
        },
    ];

    let summary_table = Table::new(summary_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();

    println!();
    println!("{summary_table}");
    println!();
}

// ─── Performance summary ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    table: String,
    queries: String,
    #[tabled(rename = "rows fetched")]
    rows_fetched: String,
    #[tabled(rename = "query (ms)")]
    query_ms: String,
    #[tabled(rename = "reconcile (ms)")]
    reconcile_ms: String,
}

/// Print a per-table performance timing table to stdout.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    println!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .by_table()
        .into_iter()
        .map(|t| PerfRow {
            table: t.table.bold().to_string(),
            queries: t.queries.to_string(),
            rows_fetched: t.rows_fetched.to_string(),
            query_ms: format_duration(t.query_ms),
            reconcile_ms: format_duration(t.reconcile_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=4)).with(Alignment::right()))
        .to_string();

    println!("{table}");

    println!(
        "  Total: {} row(s) fetched  ·  {} in queries",
        report.total_rows_fetched.to_string().bold(),
        format_duration(report.total_query_ms),
    );
    println!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}
