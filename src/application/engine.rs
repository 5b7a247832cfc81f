use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::key_index::{KeyIndex, KeyIndexEntry};
use crate::application::sampling::{SamplingStrategy, ScanPlan};
use crate::application::stream::{ChunkedRowStream, TaskBudget};
use crate::domain::{
    canonical::{CanonicalRow, NormalizationRules, RowCodec},
    cell::Cell,
    digest::{HashAlgorithm, RowDigest, RowHasher, TableChecksum},
    error::Result,
    outcome::{
        ChangedRow, ChecksumComparison, ColumnDiff, FixCandidate, MissingRow,
        ReconciliationOutcome, RowCountCheck, ScanMethod,
    },
    ports::{QueryExecutor, SampleRequest},
    table_spec::TableSpec,
    value_objects::{RowKey, TableName},
};

pub use crate::domain::outcome::ValidationMethod;

/// Tunables of the engine, shared read-only by every table task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub chunk_size: usize,
    pub hash_algorithm: HashAlgorithm,
    pub sampling: SamplingStrategy,
    pub normalization: NormalizationRules,
    /// Above this many rows on either side no key index is built; the table
    /// is compared through aggregate checksums only.
    pub missing_rows_max_table_size: u64,
    pub max_detailed_mismatches: usize,
    pub max_missing_rows_to_log: usize,
    /// Target tables up to this size keep full rows in the key index, so
    /// changed rows need no second query.
    pub retain_rows_max: u64,
    /// Collect fix candidates for every changed and missing-in-target row.
    pub collect_fixes: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            hash_algorithm: HashAlgorithm::default(),
            sampling: SamplingStrategy::default(),
            normalization: NormalizationRules::default(),
            missing_rows_max_table_size: 10_000_000,
            max_detailed_mismatches: 20,
            max_missing_rows_to_log: 20,
            retain_rows_max: 10_000,
            collect_fixes: false,
        }
    }
}

/// Compares one table of the source against its counterpart in the target.
///
/// Cheap to clone: executors and settings are shared.
#[derive(Clone)]
pub struct ReconciliationEngine {
    source: Arc<dyn QueryExecutor>,
    target: Arc<dyn QueryExecutor>,
    settings: Arc<EngineSettings>,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn QueryExecutor>,
        target: Arc<dyn QueryExecutor>,
        settings: Arc<EngineSettings>,
    ) -> Self {
        Self {
            source,
            target,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Hash reconciliation, full scan or sample depending on table size.
    pub async fn reconcile(&self, spec: &TableSpec) -> Result<ReconciliationOutcome> {
        self.run(ValidationMethod::Hash, spec).await
    }

    pub async fn run(
        &self,
        method: ValidationMethod,
        spec: &TableSpec,
    ) -> Result<ReconciliationOutcome> {
        let budget = TaskBudget::unbounded(&spec.source_table.0);
        self.run_with_budget(method, spec, &budget).await
    }

    /// Like [`Self::run`], stopping at the next chunk boundary once `budget`
    /// is cancelled or expired.
    pub async fn run_with_budget(
        &self,
        method: ValidationMethod,
        spec: &TableSpec,
        budget: &TaskBudget,
    ) -> Result<ReconciliationOutcome> {
        budget.check()?;
        let (source_rows, target_rows) = tokio::join!(
            self.source.count_rows(&spec.source_table),
            self.target.count_rows(&spec.target_table)
        );
        let row_count = RowCountCheck::new(source_rows?, target_rows?);
        if !row_count.matches() {
            warn!(
                table = %spec.source_table,
                source = row_count.source,
                target = row_count.target,
                difference = row_count.difference,
                difference_pct = row_count.difference_pct,
                "row count mismatch"
            );
        }

        let largest = row_count.source.max(row_count.target);
        let outcome = match method {
            ValidationMethod::RowCount => {
                ReconciliationOutcome::new(spec, ScanMethod::RowCount, row_count)
            }
            ValidationMethod::Hash if largest > self.settings.missing_rows_max_table_size => {
                self.aggregate(spec, row_count, budget).await?
            }
            ValidationMethod::Hash => match self.settings.sampling.plan(largest) {
                ScanPlan::FullScan => self.full_scan(spec, row_count, budget).await?,
                ScanPlan::Sample(request) => self.sample(spec, row_count, request, budget).await?,
            },
            ValidationMethod::Sample => match self.settings.sampling.forced(row_count.source) {
                ScanPlan::Sample(request) => self.sample(spec, row_count, request, budget).await?,
                ScanPlan::FullScan => self.full_scan(spec, row_count, budget).await?,
            },
        };

        info!(
            table = %spec.source_table,
            %method,
            scan = ?outcome.method,
            matched = outcome.counts.matched,
            changed = outcome.counts.changed,
            missing_in_target = outcome.counts.missing_in_target,
            missing_in_source = outcome.counts.missing_in_source,
            "table reconciled"
        );
        Ok(outcome)
    }

    /// Index the whole target, then match the whole source against it.
    async fn full_scan(
        &self,
        spec: &TableSpec,
        row_count: RowCountCheck,
        budget: &TaskBudget,
    ) -> Result<ReconciliationOutcome> {
        let mut pass = Pass::new(self, spec, ScanMethod::FullScan, row_count);
        let retain = row_count.target <= self.settings.retain_rows_max;

        let mut index = KeyIndex::new();
        let mut target = ChunkedRowStream::full_scan(
            self.target.as_ref(),
            spec.target_table.clone(),
            &spec.columns,
            &spec.key_columns,
            self.settings.chunk_size,
            budget,
        );
        while let Some(chunk) = target.next_chunk().await? {
            for raw in &chunk {
                let row = pass.codec.canonicalize(raw)?;
                let entry = KeyIndexEntry {
                    digest: pass.hasher.digest(&row),
                    row: retain.then(|| row.clone()),
                };
                index.insert(pass.codec.key_of(&row), entry);
                pass.outcome.counts.target_scanned += 1;
            }
        }
        pass.outcome.counts.duplicate_keys += index.duplicates();
        debug!(table = %spec.target_table, keys = index.len(), retain, "target index built");

        let mut source = ChunkedRowStream::full_scan(
            self.source.as_ref(),
            spec.source_table.clone(),
            &spec.columns,
            &spec.key_columns,
            self.settings.chunk_size,
            budget,
        );
        let mut previous: Option<RowKey> = None;
        while let Some(chunk) = source.next_chunk().await? {
            for raw in &chunk {
                let row = pass.codec.canonicalize(raw)?;
                let key = pass.codec.key_of(&row);
                // equal keys are adjacent in key order
                if previous.as_ref() == Some(&key) {
                    pass.outcome.counts.duplicate_keys += 1;
                    continue;
                }
                let found = index.take(&key);
                pass.classify(row, &key, found).await?;
                previous = Some(key);
            }
        }

        for (key, entry) in index.into_remaining() {
            pass.missing_in_source(&key, entry.row.as_ref());
        }
        Ok(pass.finish())
    }

    /// Drive a bounded source sample; look each sampled key up in the target.
    async fn sample(
        &self,
        spec: &TableSpec,
        row_count: RowCountCheck,
        request: SampleRequest,
        budget: &TaskBudget,
    ) -> Result<ReconciliationOutcome> {
        let mut pass = Pass::new(self, spec, ScanMethod::Sample, row_count);
        let mut source = ChunkedRowStream::sampled(
            self.source.as_ref(),
            spec.source_table.clone(),
            &spec.columns,
            &spec.key_columns,
            self.settings.chunk_size,
            budget,
            request,
        );

        while let Some(chunk) = source.next_chunk().await? {
            let mut rows = Vec::with_capacity(chunk.len());
            let mut index = KeyIndex::new();
            for raw in &chunk {
                let row = pass.codec.canonicalize(raw)?;
                let key = pass.codec.key_of(&row);
                if let Some(target_row) = pass.fetch_target(&row).await? {
                    index.insert(
                        key.clone(),
                        KeyIndexEntry {
                            digest: pass.hasher.digest(&target_row),
                            row: Some(target_row),
                        },
                    );
                    pass.outcome.counts.target_scanned += 1;
                }
                rows.push((row, key));
            }
            for (row, key) in rows {
                let found = index.take(&key);
                pass.classify(row, &key, found).await?;
            }
        }
        pass.outcome.warnings.push(format!(
            "sampled at most {} of {} source rows ({:?}); rows present only in the target are not detected",
            request.size, row_count.source, request.method
        ));
        Ok(pass.finish())
    }

    /// Order-independent checksum per side, O(chunk) memory.
    async fn aggregate(
        &self,
        spec: &TableSpec,
        row_count: RowCountCheck,
        budget: &TaskBudget,
    ) -> Result<ReconciliationOutcome> {
        let mut pass = Pass::new(self, spec, ScanMethod::Aggregate, row_count);
        let (source, target) = tokio::join!(
            self.checksum(self.source.as_ref(), &spec.source_table, &pass, budget),
            self.checksum(self.target.as_ref(), &spec.target_table, &pass, budget),
        );
        let (source, target) = (source?, target?);

        pass.outcome.counts.source_scanned = source.rows;
        pass.outcome.counts.target_scanned = target.rows;
        pass.outcome.checksum = Some(ChecksumComparison {
            source: source.hex(),
            target: target.hex(),
        });
        pass.outcome.warnings.push(format!(
            "table exceeds {} rows: compared by aggregate checksum, no row-level detail",
            self.settings.missing_rows_max_table_size
        ));
        Ok(pass.finish())
    }

    async fn checksum(
        &self,
        executor: &dyn QueryExecutor,
        table: &TableName,
        pass: &Pass<'_>,
        budget: &TaskBudget,
    ) -> Result<TableChecksum> {
        let mut sum = TableChecksum::default();
        let mut stream = ChunkedRowStream::full_scan(
            executor,
            table.clone(),
            &pass.spec.columns,
            &pass.spec.key_columns,
            self.settings.chunk_size,
            budget,
        );
        while let Some(chunk) = stream.next_chunk().await? {
            for raw in &chunk {
                sum.add(&pass.hasher.digest(&pass.codec.canonicalize(raw)?));
            }
        }
        Ok(sum)
    }
}

/// State of one reconciliation pass over one table.
struct Pass<'a> {
    engine: &'a ReconciliationEngine,
    spec: &'a TableSpec,
    codec: RowCodec<'a>,
    hasher: RowHasher,
    outcome: ReconciliationOutcome,
}

impl<'a> Pass<'a> {
    fn new(
        engine: &'a ReconciliationEngine,
        spec: &'a TableSpec,
        method: ScanMethod,
        row_count: RowCountCheck,
    ) -> Self {
        Self {
            engine,
            spec,
            codec: RowCodec::new(spec, &engine.settings.normalization),
            hasher: RowHasher::new(engine.settings.hash_algorithm),
            outcome: ReconciliationOutcome::new(spec, method, row_count),
        }
    }

    fn settings(&self) -> &EngineSettings {
        &self.engine.settings
    }

    async fn fetch_target(&self, source_row: &CanonicalRow) -> Result<Option<CanonicalRow>> {
        let key = self.codec.key_cells(source_row);
        match self
            .engine
            .target
            .fetch_row_by_key(&self.spec.target_table, &self.spec.columns, &key)
            .await?
        {
            Some(raw) => Ok(Some(self.codec.canonicalize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Classify one source row against the target entry for its key.
    async fn classify(
        &mut self,
        row: CanonicalRow,
        key: &RowKey,
        found: Option<KeyIndexEntry>,
    ) -> Result<()> {
        self.outcome.counts.source_scanned += 1;
        let digest: RowDigest = self.hasher.digest(&row);

        let Some(entry) = found else {
            self.missing_in_target(&row, key);
            return Ok(());
        };
        if entry.digest == digest {
            self.outcome.counts.matched += 1;
            return Ok(());
        }

        self.outcome.counts.changed += 1;
        let wants_detail = self.outcome.changed_rows.len() < self.settings().max_detailed_mismatches;
        if !wants_detail && !self.settings().collect_fixes {
            return Ok(());
        }
        let target_row = match entry.row {
            Some(r) => Some(r),
            None => self.fetch_target(&row).await?,
        };
        let Some(target_row) = target_row else {
            // deleted from the target between index build and lookup
            return Ok(());
        };

        let differing = row.differing_columns(&target_row);
        if wants_detail {
            let columns = differing
                .iter()
                .map(|c| ColumnDiff {
                    column: c.clone(),
                    source: row.get(c).map(|v| v.value.clone()).unwrap_or(Cell::Null),
                    target: target_row.get(c).map(|v| v.value.clone()).unwrap_or(Cell::Null),
                })
                .collect();
            self.outcome.changed_rows.push(ChangedRow {
                key: key.describe(&self.spec.key_columns),
                columns,
            });
        }
        if self.settings().collect_fixes {
            let changes = differing
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.value.clone())))
                .collect();
            self.outcome.fix_candidates.push(FixCandidate::Update {
                key: self.codec.key_cells(&row),
                changes,
            });
        }
        Ok(())
    }

    fn missing_in_target(&mut self, row: &CanonicalRow, key: &RowKey) {
        self.outcome.counts.missing_in_target += 1;
        if self.outcome.missing_in_target.len() < self.settings().max_missing_rows_to_log {
            let described = key.describe(&self.spec.key_columns);
            warn!(table = %self.spec.source_table, key = %described, "row missing in target");
            self.outcome.missing_in_target.push(MissingRow {
                key: described,
                row: Some(row.values()),
            });
        }
        if self.settings().collect_fixes {
            self.outcome
                .fix_candidates
                .push(FixCandidate::Insert { row: row.values() });
        }
    }

    fn missing_in_source(&mut self, key: &RowKey, row: Option<&CanonicalRow>) {
        self.outcome.counts.missing_in_source += 1;
        if self.outcome.missing_in_source.len() < self.settings().max_missing_rows_to_log {
            let described = key.describe(&self.spec.key_columns);
            warn!(table = %self.spec.target_table, key = %described, "row missing in source");
            self.outcome.missing_in_source.push(MissingRow {
                key: described,
                row: row.map(|r| r.values()),
            });
        }
    }

    fn finish(mut self) -> ReconciliationOutcome {
        if self.outcome.counts.duplicate_keys > 0 {
            self.outcome.warnings.push(format!(
                "{} rows share an identifying key with another row and were not compared individually",
                self.outcome.counts.duplicate_keys
            ));
        }
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::RawRow;
    use crate::domain::memory::{MemoryExecutor, MemoryTable};
    use crate::domain::ports::SampleMethod;
    use crate::domain::table_spec::KeyKind;
    use crate::domain::error::ReconcileError;
    use crate::domain::value_objects::{ColumnName, IgnoredColumns, Side};

    fn order(id: i64, amount: &str, status: &str, loaded_at: &str) -> RawRow {
        [
            ("id".to_string(), Cell::Int(id)),
            ("amount".to_string(), Cell::decimal(amount)),
            ("status".to_string(), Cell::text(status)),
            ("etl_loaded_at".to_string(), Cell::text(loaded_at)),
        ]
        .into()
    }

    fn orders(rows: impl IntoIterator<Item = RawRow>) -> MemoryTable {
        MemoryTable::new(&["id", "amount", "status", "etl_loaded_at"], &["id"]).with_rows(rows)
    }

    fn spec() -> TableSpec {
        TableSpec::new(
            TableName("orders".into()),
            TableName("orders".into()),
            ["id", "amount", "status", "etl_loaded_at"]
                .iter()
                .map(|c| ColumnName::from(*c))
                .collect(),
            vec![ColumnName::from("id")],
            KeyKind::PrimaryKey,
            IgnoredColumns(vec!["etl_loaded_at".into()]),
        )
        .unwrap()
    }

    fn engine(source: MemoryTable, target: MemoryTable, settings: EngineSettings) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::new(MemoryExecutor::new(Side::Source).with_table("orders", source)),
            Arc::new(MemoryExecutor::new(Side::Target).with_table("orders", target)),
            Arc::new(settings),
        )
    }

    fn small_chunks() -> EngineSettings {
        EngineSettings {
            chunk_size: 64,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn identical_tables_pass() {
        let src = orders((1..=50).map(|i| order(i, "10.00", "paid", "2024-01-01")));
        // ETL metadata differs on every row
        let tgt = orders((1..=50).map(|i| order(i, "10.00", "paid", "2025-02-02")));
        let outcome = engine(src, tgt, small_chunks()).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.method, ScanMethod::FullScan);
        assert_eq!(outcome.counts.matched, 50);
        assert_eq!(outcome.mismatches(), 0);
        assert!(outcome.missing_in_source_checked);
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn orders_missing_five_rows_in_target() {
        let src = orders((1..=1000).map(|i| order(i, "10.00", "paid", "t")));
        let tgt = orders((1..=995).map(|i| order(i, "10.00", "paid", "t")));
        let outcome = engine(src, tgt, small_chunks()).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.counts.missing_in_target, 5);
        assert_eq!(outcome.counts.changed, 0);
        assert_eq!(outcome.counts.matched, 995);
        assert_eq!(outcome.counts.missing_in_source, 0);
        let keys: Vec<&str> = outcome.missing_in_target.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["id=996", "id=997", "id=998", "id=999", "id=1000"]);
        assert_eq!(outcome.row_count.difference, 5);
    }

    #[tokio::test]
    async fn single_missing_key_counted_once_each_direction() {
        let src = orders([order(1, "1", "a", "t"), order(2, "1", "a", "t")]);
        let tgt = orders([order(1, "1", "a", "t"), order(3, "1", "a", "t")]);
        let outcome = engine(src, tgt, small_chunks()).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.counts.missing_in_target, 1);
        assert_eq!(outcome.counts.missing_in_source, 1);
        assert_eq!(outcome.missing_in_target[0].key, "id=2");
        assert_eq!(outcome.missing_in_source[0].key, "id=3");
    }

    #[tokio::test]
    async fn changed_row_lists_exactly_the_differing_columns() {
        let src = orders([order(1, "150.00", "paid", "t"), order(2, "5", "new", "t")]);
        let tgt = orders([order(1, "150.0", "paid", "x"), order(2, "5", "new", "x")]);
        let outcome = engine(src, tgt, small_chunks()).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.counts.changed, 1);
        assert_eq!(outcome.counts.matched, 1);
        let changed = &outcome.changed_rows[0];
        assert_eq!(changed.key, "id=1");
        let cols: Vec<&str> = changed.columns.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(cols, vec!["amount"]);
        assert_eq!(changed.columns[0].source, Cell::decimal("150.00"));
        assert_eq!(changed.columns[0].target, Cell::decimal("150.0"));
    }

    #[tokio::test]
    async fn detail_caps_do_not_stop_counting() {
        let src = orders((1..=25).map(|i| order(i, "2", "paid", "t")));
        let tgt = orders((1..=25).map(|i| order(i, "1", "paid", "t")));
        let settings = EngineSettings {
            max_detailed_mismatches: 20,
            retain_rows_max: 0,
            ..small_chunks()
        };
        let outcome = engine(src, tgt, settings).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.counts.changed, 25);
        assert_eq!(outcome.changed_rows.len(), 20);
        assert!(outcome.changed_rows.iter().all(|c| c.columns.len() == 1));
    }

    #[tokio::test]
    async fn missing_rows_capped_per_direction() {
        let src = orders((1..=30).map(|i| order(i, "1", "a", "t")));
        let tgt = orders((31..=60).map(|i| order(i, "1", "a", "t")));
        let settings = EngineSettings {
            max_missing_rows_to_log: 20,
            ..small_chunks()
        };
        let outcome = engine(src, tgt, settings).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.counts.missing_in_target, 30);
        assert_eq!(outcome.counts.missing_in_source, 30);
        assert_eq!(outcome.missing_in_target.len(), 20);
        assert_eq!(outcome.missing_in_source.len(), 20);
    }

    #[tokio::test]
    async fn large_tables_are_sampled_within_bounds() {
        let src = orders((1..=500).map(|i| order(i, "1", "a", "t")));
        let mut tgt_rows: Vec<RawRow> = (1..=500).map(|i| order(i, "1", "a", "t")).collect();
        tgt_rows[9] = order(10, "2", "a", "t");
        let settings = EngineSettings {
            chunk_size: 16,
            sampling: SamplingStrategy {
                full_scan_threshold: 100,
                sample_size: 50,
                method: SampleMethod::Systematic,
            },
            ..Default::default()
        };
        let outcome = engine(src, orders(tgt_rows), settings).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.method, ScanMethod::Sample);
        assert!(outcome.counts.source_scanned <= 50);
        assert!(!outcome.missing_in_source_checked);
        // every 10th row starting with id 1: id 10 is not sampled
        assert_eq!(outcome.counts.changed, 0);
        assert_eq!(outcome.counts.matched, outcome.counts.source_scanned);
    }

    #[tokio::test]
    async fn sample_detects_changed_rows_among_sampled_keys() {
        let src = orders((1..=20).map(|i| order(i, "1", "a", "t")));
        let tgt = orders((1..=20).map(|i| order(i, if i == 1 { "9" } else { "1" }, "a", "t")));
        let settings = EngineSettings {
            sampling: SamplingStrategy {
                full_scan_threshold: 0,
                sample_size: 5,
                method: SampleMethod::Systematic,
            },
            ..small_chunks()
        };
        let outcome = engine(src, tgt, settings)
            .run(ValidationMethod::Sample, &spec())
            .await
            .unwrap();
        assert_eq!(outcome.counts.source_scanned, 5);
        assert_eq!(outcome.counts.changed, 1);
        assert_eq!(outcome.changed_rows[0].key, "id=1");
    }

    #[tokio::test]
    async fn oversized_tables_fall_back_to_checksums() {
        let src = orders((1..=40).map(|i| order(i, "1", "a", "t")));
        let tgt = orders((1..=40).map(|i| order(i, "1", "a", "other")));
        let settings = EngineSettings {
            missing_rows_max_table_size: 10,
            ..small_chunks()
        };
        let outcome = engine(src, tgt, settings).reconcile(&spec()).await.unwrap();
        assert_eq!(outcome.method, ScanMethod::Aggregate);
        assert!(outcome.checksum.as_ref().unwrap().matches());
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn row_count_method_reads_no_rows() {
        let src = orders((1..=3).map(|i| order(i, "1", "a", "t")));
        let tgt = orders((1..=2).map(|i| order(i, "1", "a", "t")));
        let outcome = engine(src, tgt, small_chunks())
            .run(ValidationMethod::RowCount, &spec())
            .await
            .unwrap();
        assert_eq!(outcome.method, ScanMethod::RowCount);
        assert_eq!(outcome.counts.source_scanned, 0);
        assert!(!outcome.is_clean());
    }

    #[tokio::test]
    async fn absent_target_table_is_table_not_found() {
        let engine = ReconciliationEngine::new(
            Arc::new(MemoryExecutor::new(Side::Source).with_table("orders", orders([]))),
            Arc::new(MemoryExecutor::new(Side::Target)),
            Arc::new(EngineSettings::default()),
        );
        let err = engine.reconcile(&spec()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::TableNotFound {
                side: Side::Target,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn all_columns_key_counts_collapsed_duplicates() {
        let table = || {
            MemoryTable::new(&["a", "b"], &[]).with_rows(
                [("x", 1), ("x", 1), ("y", 2)]
                    .into_iter()
                    .map(|(a, b)| [("a".to_string(), Cell::text(a)), ("b".to_string(), Cell::Int(b))].into()),
            )
        };
        let spec = TableSpec::new(
            TableName("log".into()),
            TableName("log".into()),
            vec![ColumnName::from("a"), ColumnName::from("b")],
            vec![],
            KeyKind::AllColumns,
            IgnoredColumns::default(),
        )
        .unwrap();
        let engine = ReconciliationEngine::new(
            Arc::new(MemoryExecutor::new(Side::Source).with_table("log", table())),
            Arc::new(MemoryExecutor::new(Side::Target).with_table("log", table())),
            Arc::new(EngineSettings::default()),
        );
        let outcome = engine.reconcile(&spec).await.unwrap();
        assert_eq!(outcome.counts.matched, 2);
        assert_eq!(outcome.counts.duplicate_keys, 2);
        assert_eq!(outcome.mismatches(), 0);
        assert!(outcome.warnings.len() >= 2);
    }
}
