use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::error::{ErrorKind, ReconcileError};
use crate::domain::fix::FixStatement;
use crate::domain::outcome::{ReconciliationOutcome, ScanMethod, ValidationMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Pass,
    Fail,
    Error,
}

/// How much a passing check actually proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assurance {
    /// Every row on both sides was matched by key.
    Exhaustive,
    /// Only a sample was compared; absence of mismatches is not proof.
    Statistical,
    /// Row counts only.
    CountOnly,
    /// Whole-table aggregate checksums, no per-row detail.
    Checksum,
}

impl From<ScanMethod> for Assurance {
    fn from(method: ScanMethod) -> Self {
        match method {
            ScanMethod::RowCount => Assurance::CountOnly,
            ScanMethod::FullScan => Assurance::Exhaustive,
            ScanMethod::Sample => Assurance::Statistical,
            ScanMethod::Aggregate => Assurance::Checksum,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of one validation method on one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub target_table: String,
    pub method: ValidationMethod,
    pub status: TableStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assurance: Option<Assurance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconciliationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TableError>,
    pub notes: Vec<String>,
    pub duration_ms: u128,
}

impl TableReport {
    pub fn from_outcome(
        method: ValidationMethod,
        outcome: ReconciliationOutcome,
        duration_ms: u128,
    ) -> Self {
        let status = if outcome.is_clean() {
            TableStatus::Pass
        } else {
            TableStatus::Fail
        };
        Self {
            table: outcome.spec.source_table.0.clone(),
            target_table: outcome.spec.target_table.0.clone(),
            method,
            status,
            assurance: Some(outcome.method.into()),
            notes: Vec::new(),
            outcome: Some(outcome),
            error: None,
            duration_ms,
        }
    }

    pub fn from_error(
        table: &str,
        target_table: &str,
        method: ValidationMethod,
        err: &ReconcileError,
        duration_ms: u128,
    ) -> Self {
        Self {
            table: table.to_string(),
            target_table: target_table.to_string(),
            method,
            status: TableStatus::Error,
            assurance: None,
            outcome: None,
            error: Some(TableError {
                kind: err.kind(),
                message: err.to_string(),
            }),
            notes: Vec::new(),
            duration_ms,
        }
    }
}

/// Fix statements produced for one table, or the reason there are none.
#[derive(Debug, Clone, Serialize)]
pub struct TableFixes {
    pub table: String,
    pub statements: Vec<FixStatement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub checks: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub pass_pct: f64,
    pub fail_pct: f64,
    pub error_pct: f64,
    pub rows_matched: u64,
    pub rows_changed: u64,
    pub rows_missing_in_target: u64,
    pub rows_missing_in_source: u64,
    pub fix_statements: usize,
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64 * 10_000.0).round() / 100.0
    }
}

impl RunSummary {
    fn compute(tables: &[TableReport], fixes: &[TableFixes]) -> Self {
        let checks = tables.len();
        let count = |s: TableStatus| tables.iter().filter(|t| t.status == s).count();
        let (passed, failed, errored) = (
            count(TableStatus::Pass),
            count(TableStatus::Fail),
            count(TableStatus::Error),
        );
        let outcomes = || tables.iter().filter_map(|t| t.outcome.as_ref());
        Self {
            checks,
            passed,
            failed,
            errored,
            pass_pct: pct(passed, checks),
            fail_pct: pct(failed, checks),
            error_pct: pct(errored, checks),
            rows_matched: outcomes().map(|o| o.counts.matched).sum(),
            rows_changed: outcomes().map(|o| o.counts.changed).sum(),
            rows_missing_in_target: outcomes().map(|o| o.counts.missing_in_target).sum(),
            rows_missing_in_source: outcomes().map(|o| o.counts.missing_in_source).sum(),
            fix_statements: fixes.iter().map(|f| f.statements.len()).sum(),
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub created_at: String,
    pub source_schema: String,
    pub target_schema: String,
    /// Driver of the target database; fix statements are rendered for it.
    pub target_driver: String,
    pub tables: Vec<TableReport>,
    pub fixes: Vec<TableFixes>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(
        source_schema: &str,
        target_schema: &str,
        target_driver: &str,
        tables: Vec<TableReport>,
        fixes: Vec<TableFixes>,
    ) -> Self {
        let summary = RunSummary::compute(&tables, &fixes);
        RunReport {
            run_id: format!(
                "run_{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                Uuid::new_v4().simple()
            ),
            created_at: Utc::now().to_rfc3339(),
            source_schema: source_schema.to_string(),
            target_schema: target_schema.to_string(),
            target_driver: target_driver.to_string(),
            tables,
            fixes,
            summary,
        }
    }

    /// `true` when any check failed or errored.
    pub fn has_failures(&self) -> bool {
        self.summary.failed + self.summary.errored > 0
    }
}
