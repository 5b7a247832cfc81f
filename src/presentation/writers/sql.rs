use std::fmt::Write as FmtWrite;

use anyhow::Result;

use crate::domain::{fix::FixKind, ports::OutputWriter, report::RunReport};
use crate::infrastructure::db::dialect::{from_driver, QueryDialect};
use crate::infrastructure::db::sql_utils::build_fix_statement;

/// Renders the fix file: every corrective statement of the run, grouped by
/// table, for the target driver. Never contains a DELETE.
pub struct SqlWriter;

impl OutputWriter for SqlWriter {
    fn format(&self, report: &RunReport) -> Result<String> {
        let dialect = from_driver(&report.target_driver);
        let dialect: &dyn QueryDialect = dialect.as_ref();
        let mut sql = String::new();

        let (updates, inserts) = report
            .fixes
            .iter()
            .flat_map(|f| &f.statements)
            .fold((0, 0), |(u, i), s| match s.kind {
                FixKind::Update => (u + 1, i),
                FixKind::Insert => (u, i + 1),
            });

        writeln!(sql, "-- Run: {}", report.run_id)?;
        writeln!(sql, "-- Source: {}", report.source_schema)?;
        writeln!(sql, "-- Target: {}", report.target_schema)?;
        writeln!(sql, "-- Driver: {}", report.target_driver)?;
        writeln!(sql, "-- Generated: {}", report.created_at)?;
        writeln!(
            sql,
            "-- Statements: {} ({} updates, {} inserts)",
            updates + inserts,
            updates,
            inserts
        )?;
        writeln!(sql, "-- Review before applying.")?;
        writeln!(sql)?;

        let mut n = 0;
        for table in &report.fixes {
            if let Some(reason) = &table.skipped {
                writeln!(sql, "-- skipped: {}: {}", table.table, reason)?;
                writeln!(sql)?;
                continue;
            }
            if table.statements.is_empty() {
                continue;
            }

            writeln!(sql, "-- ============================================")?;
            writeln!(sql, "-- Table: {}", table.table)?;
            writeln!(sql, "-- ============================================")?;
            writeln!(sql)?;

            for stmt in &table.statements {
                n += 1;
                writeln!(sql, "-- [{}] {} {}", n, stmt.kind, stmt.table)?;
                writeln!(sql, "{}", build_fix_statement(stmt, dialect, &report.target_schema))?;
                writeln!(sql)?;
            }
        }

        Ok(sql)
    }

    fn extension(&self) -> &'static str {
        "sql"
    }
}
