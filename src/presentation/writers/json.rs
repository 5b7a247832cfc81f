use anyhow::Result;
use serde::Serialize;

use crate::domain::{
    fix::FixStatement,
    ports::OutputWriter,
    report::{RunReport, RunSummary, TableReport},
};
use crate::infrastructure::db::dialect::{from_driver, QueryDialect};
use crate::infrastructure::db::sql_utils::build_fix_statement;

// ─── Serialisation view types ─────────────────────────────────────────────────
//
// These mirror the domain structs but add a `sql` field to each fix
// statement, rendered for the target driver. They are presentation-only.

#[derive(Serialize)]
struct JsonRunReport<'a> {
    run_id: &'a str,
    created_at: &'a str,
    source_schema: &'a str,
    target_schema: &'a str,
    target_driver: &'a str,
    summary: &'a RunSummary,
    tables: &'a [TableReport],
    fixes: Vec<JsonTableFixes<'a>>,
}

#[derive(Serialize)]
struct JsonTableFixes<'a> {
    table: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<&'a str>,
    statements: Vec<JsonFix<'a>>,
}

#[derive(Serialize)]
struct JsonFix<'a> {
    #[serde(flatten)]
    statement: &'a FixStatement,
    sql: String,
}

// ─── Writer ───────────────────────────────────────────────────────────────────

pub struct JsonWriter;

impl OutputWriter for JsonWriter {
    fn format(&self, report: &RunReport) -> Result<String> {
        let dialect = from_driver(&report.target_driver);
        let dialect: &dyn QueryDialect = dialect.as_ref();

        let view = JsonRunReport {
            run_id: &report.run_id,
            created_at: &report.created_at,
            source_schema: &report.source_schema,
            target_schema: &report.target_schema,
            target_driver: &report.target_driver,
            summary: &report.summary,
            tables: &report.tables,
            fixes: report
                .fixes
                .iter()
                .map(|f| JsonTableFixes {
                    table: &f.table,
                    skipped: f.skipped.as_deref(),
                    statements: f
                        .statements
                        .iter()
                        .map(|s| JsonFix {
                            statement: s,
                            sql: build_fix_statement(s, dialect, &report.target_schema),
                        })
                        .collect(),
                })
                .collect(),
        };

        Ok(serde_json::to_string_pretty(&view)?)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::Cell;
    use crate::domain::fix::FixKind;
    use crate::domain::outcome::{ReconciliationOutcome, RowCountCheck, ScanMethod, ValidationMethod};
    use crate::domain::report::TableFixes;
    use crate::domain::table_spec::{KeyKind, TableSpec};
    use crate::domain::value_objects::{ColumnName, IgnoredColumns, TableName};
    use serde_json::Value;

    fn make_report(driver: &str) -> RunReport {
        let spec = TableSpec::new(
            TableName("orders".into()),
            TableName("orders".into()),
            vec![ColumnName::from("id"), ColumnName::from("amount")],
            vec![ColumnName::from("id")],
            KeyKind::PrimaryKey,
            IgnoredColumns::default(),
        )
        .unwrap();
        let outcome = ReconciliationOutcome::new(&spec, ScanMethod::FullScan, RowCountCheck::new(1000, 995));
        let fixes = TableFixes {
            table: "orders".into(),
            statements: vec![FixStatement {
                kind: FixKind::Update,
                table: TableName("orders".into()),
                assignments: vec![("amount".into(), Cell::decimal("150.00"))],
                key: vec![("id".into(), Cell::Int(17))],
            }],
            skipped: None,
        };
        RunReport::new(
            "public",
            "public",
            driver,
            vec![TableReport::from_outcome(ValidationMethod::Hash, outcome, 12)],
            vec![fixes],
        )
    }

    #[test]
    fn json_output_carries_summary_and_row_counts() {
        let output = JsonWriter.format(&make_report("postgres")).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["summary"]["checks"], 1);
        assert_eq!(parsed["summary"]["failed"], 1);
        let table = &parsed["tables"][0];
        assert_eq!(table["status"], "fail");
        assert_eq!(table["assurance"], "exhaustive");
        assert_eq!(table["outcome"]["row_count"]["difference"], 5);
    }

    #[test]
    fn json_output_contains_sql_field_for_each_fix() {
        let output = JsonWriter.format(&make_report("postgres")).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        let fix = &parsed["fixes"][0]["statements"][0];
        assert_eq!(fix["kind"], "UPDATE");
        assert_eq!(
            fix["sql"],
            r#"UPDATE "public"."orders" SET "amount" = 150.00 WHERE "id" = 17;"#
        );
    }

    #[test]
    fn json_output_sql_uses_target_dialect_quoting() {
        let output = JsonWriter.format(&make_report("mysql")).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        let sql = parsed["fixes"][0]["statements"][0]["sql"].as_str().unwrap();
        // MySQL uses backticks
        assert!(sql.contains('`'), "expected backticks, got: {sql}");
    }
}
