use serde::Serialize;

use crate::domain::cell::{Cell, RawRow};
use crate::domain::table_spec::{KeyKind, TableSpec};

/// Validation methods a run can apply to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    /// Compare row counts only.
    RowCount,
    /// Hash comparison, full scan or sample depending on table size.
    Hash,
    /// Hash comparison of a bounded sample, whatever the table size.
    Sample,
}

impl std::fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationMethod::RowCount => f.write_str("row_count"),
            ValidationMethod::Hash => f.write_str("hash"),
            ValidationMethod::Sample => f.write_str("sample"),
        }
    }
}

/// How the rows of a table were examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    /// Counts only, no row was read.
    RowCount,
    /// Every row on both sides, matched key to key.
    FullScan,
    /// A bounded source sample, target rows fetched by key.
    Sample,
    /// Table too large for key matching: per-side aggregate checksums.
    Aggregate,
}

/// Row counts of both sides, with the source-relative difference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RowCountCheck {
    pub source: u64,
    pub target: u64,
    /// `source - target`
    pub difference: i64,
    /// Difference as a percentage of the source count, 2 decimals.
    pub difference_pct: f64,
}

impl RowCountCheck {
    pub fn new(source: u64, target: u64) -> Self {
        let difference = source as i64 - target as i64;
        let difference_pct = if source > 0 {
            (difference as f64 / source as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            source,
            target,
            difference,
            difference_pct,
        }
    }

    pub fn matches(&self) -> bool {
        self.difference == 0
    }
}

/// Aggregate checksums of both sides (see [`ScanMethod::Aggregate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumComparison {
    pub source: String,
    pub target: String,
}

impl ChecksumComparison {
    pub fn matches(&self) -> bool {
        self.source == self.target
    }
}

/// Running counters of a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub source_scanned: u64,
    pub target_scanned: u64,
    pub matched: u64,
    pub changed: u64,
    pub missing_in_target: u64,
    pub missing_in_source: u64,
    /// Rows that collapsed onto an already indexed key.
    pub duplicate_keys: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDiff {
    pub column: String,
    pub source: Cell,
    pub target: Cell,
}

/// A key present on both sides whose contents differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedRow {
    pub key: String,
    pub columns: Vec<ColumnDiff>,
}

/// A key present on one side only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingRow {
    pub key: String,
    /// Row contents, when they were available without another query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<RawRow>,
}

/// Raw material for a corrective statement, always holding source values.
#[derive(Debug, Clone, PartialEq)]
pub enum FixCandidate {
    Update {
        key: Vec<(String, Cell)>,
        changes: Vec<(String, Cell)>,
    },
    Insert {
        row: RawRow,
    },
}

/// Result of reconciling one table.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    #[serde(skip)]
    pub spec: TableSpec,
    pub method: ScanMethod,
    pub key_kind: KeyKind,
    pub row_count: RowCountCheck,
    pub counts: RowCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumComparison>,
    pub changed_rows: Vec<ChangedRow>,
    pub missing_in_target: Vec<MissingRow>,
    pub missing_in_source: Vec<MissingRow>,
    /// `false` when the pass could not look for target-only rows (sampling).
    pub missing_in_source_checked: bool,
    #[serde(skip)]
    pub fix_candidates: Vec<FixCandidate>,
    pub warnings: Vec<String>,
}

impl ReconciliationOutcome {
    pub fn new(spec: &TableSpec, method: ScanMethod, row_count: RowCountCheck) -> Self {
        Self {
            key_kind: spec.key_kind,
            warnings: spec.warnings.clone(),
            spec: spec.clone(),
            method,
            row_count,
            counts: RowCounts::default(),
            checksum: None,
            changed_rows: Vec::new(),
            missing_in_target: Vec::new(),
            missing_in_source: Vec::new(),
            missing_in_source_checked: method == ScanMethod::FullScan,
            fix_candidates: Vec::new(),
        }
    }

    /// Number of row-level discrepancies found (not counting the row count
    /// check itself).
    pub fn mismatches(&self) -> u64 {
        self.counts.changed + self.counts.missing_in_target + self.counts.missing_in_source
    }

    /// `true` when nothing examined by this pass disagrees.
    pub fn is_clean(&self) -> bool {
        let checksum_ok = self.checksum.as_ref().map(|c| c.matches()).unwrap_or(true);
        self.row_count.matches() && self.mismatches() == 0 && checksum_ok
    }
}
