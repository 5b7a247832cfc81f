use crate::domain::{
    error::{ReconcileError, Result},
    fix::{FixKind, FixStatement},
    outcome::{FixCandidate, ReconciliationOutcome},
};

/// Turn the fix candidates of an outcome into target-side statements.
///
/// One UPDATE per changed row (differing columns only, source values), one
/// INSERT per row missing in the target. Rows missing in the source produce
/// nothing: the source is the reference and deletions are never proposed.
pub fn generate_fix_statements(outcome: &ReconciliationOutcome) -> Result<Vec<FixStatement>> {
    let spec = &outcome.spec;
    if !spec.has_identifying_key() {
        return Err(ReconcileError::UnsupportedFixTarget(spec.source_table.0.clone()));
    }

    let statements = outcome
        .fix_candidates
        .iter()
        .filter_map(|candidate| match candidate {
            FixCandidate::Update { key, changes } if !changes.is_empty() => Some(FixStatement {
                kind: FixKind::Update,
                table: spec.target_table.clone(),
                assignments: changes.clone(),
                key: key.clone(),
            }),
            FixCandidate::Update { .. } => None,
            FixCandidate::Insert { row } => Some(FixStatement {
                kind: FixKind::Insert,
                table: spec.target_table.clone(),
                assignments: row
                    .iter()
                    .filter(|(col, _)| !spec.ignored.contains(col))
                    .map(|(col, val)| (col.clone(), val.clone()))
                    .collect(),
                key: Vec::new(),
            }),
        })
        .collect();
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::{EngineSettings, ReconciliationEngine};
    use crate::domain::cell::{Cell, RawRow};
    use crate::domain::memory::{MemoryExecutor, MemoryTable};
    use crate::domain::table_spec::{KeyKind, TableSpec};
    use crate::domain::value_objects::{ColumnName, IgnoredColumns, Side, TableName};
    use crate::infrastructure::db::dialect::PostgresDialect;
    use crate::infrastructure::db::sql_utils::build_fix_statement;
    use std::sync::Arc;

    fn order(id: i64, amount: &str, batch: i64) -> RawRow {
        [
            ("id".to_string(), Cell::Int(id)),
            ("amount".to_string(), Cell::decimal(amount)),
            ("batch_id".to_string(), Cell::Int(batch)),
        ]
        .into()
    }

    fn spec(kind: KeyKind) -> TableSpec {
        TableSpec::new(
            TableName("orders".into()),
            TableName("orders_v2".into()),
            vec!["id".into(), "amount".into(), "batch_id".into()],
            vec![ColumnName::from("id")],
            kind,
            IgnoredColumns(vec!["batch_id".into()]),
        )
        .unwrap()
    }

    async fn outcome(source: Vec<RawRow>, target: Vec<RawRow>, kind: KeyKind) -> ReconciliationOutcome {
        let columns = &["id", "amount", "batch_id"];
        let engine = ReconciliationEngine::new(
            Arc::new(
                MemoryExecutor::new(Side::Source)
                    .with_table("orders", MemoryTable::new(columns, &["id"]).with_rows(source)),
            ),
            Arc::new(
                MemoryExecutor::new(Side::Target)
                    .with_table("orders_v2", MemoryTable::new(columns, &["id"]).with_rows(target)),
            ),
            Arc::new(EngineSettings {
                collect_fixes: true,
                ..Default::default()
            }),
        );
        engine.reconcile(&spec(kind)).await.unwrap()
    }

    #[tokio::test]
    async fn numeric_text_difference_yields_one_update() {
        let out = outcome(vec![order(17, "150.00", 1)], vec![order(17, "150.0", 9)], KeyKind::PrimaryKey).await;
        let stmts = generate_fix_statements(&out).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].kind, FixKind::Update);
        assert_eq!(
            build_fix_statement(&stmts[0], &PostgresDialect, "public"),
            r#"UPDATE "public"."orders_v2" SET "amount" = 150.00 WHERE "id" = 17;"#
        );
    }

    #[tokio::test]
    async fn missing_rows_become_inserts_without_ignored_columns() {
        let out = outcome(vec![order(1, "5", 1), order(2, "6", 1)], vec![order(1, "5", 1)], KeyKind::PrimaryKey).await;
        let stmts = generate_fix_statements(&out).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].kind, FixKind::Insert);
        let cols: Vec<&str> = stmts[0].assignments.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(cols, vec!["amount", "id"]);
    }

    #[tokio::test]
    async fn never_emits_delete() {
        let out = outcome(
            vec![order(1, "1", 1), order(2, "2", 1)],
            vec![order(2, "3", 1), order(3, "3", 1), order(4, "4", 1)],
            KeyKind::PrimaryKey,
        )
        .await;
        assert_eq!(out.counts.missing_in_source, 2);
        let stmts = generate_fix_statements(&out).unwrap();
        assert_eq!(stmts.len(), 2);
        for stmt in &stmts {
            let sql = build_fix_statement(stmt, &PostgresDialect, "public");
            assert!(!sql.to_uppercase().contains("DELETE"), "{sql}");
        }
    }

    #[tokio::test]
    async fn tables_without_key_are_unsupported() {
        let out = outcome(vec![order(1, "1", 1)], vec![], KeyKind::AllColumns).await;
        let err = generate_fix_statements(&out).unwrap_err();
        assert!(matches!(err, ReconcileError::UnsupportedFixTarget(_)));
    }
}
