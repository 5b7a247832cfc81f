use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::error::{ReconcileError, Result};
use crate::domain::ports::TableCatalog;
use crate::domain::table_spec::TableSpec;
use crate::domain::value_objects::{IgnoredColumns, Side, TableName};
use crate::infrastructure::config::TablesConfig;

/// One table selected for reconciliation. A TableSpec that failed to resolve
/// still yields an entry, so the run can report it.
#[derive(Debug)]
pub struct PlannedTable {
    pub source: TableName,
    pub target: TableName,
    pub spec: Result<TableSpec>,
}

/// Resolves which tables to check and builds their [`TableSpec`]s from the
/// catalogs of both sides.
pub struct TableDiscovery {
    source: Arc<dyn TableCatalog>,
    target: Arc<dyn TableCatalog>,
}

impl TableDiscovery {
    pub fn new(source: Arc<dyn TableCatalog>, target: Arc<dyn TableCatalog>) -> Self {
        Self { source, target }
    }

    /// Table selection: `include` (or every source table when empty), minus
    /// `exclude`, narrowed to `only` when non-empty. Failing to list the
    /// source tables fails the whole plan; per-table problems do not.
    pub async fn plan(
        &self,
        tables: &TablesConfig,
        global_ignored: &IgnoredColumns,
        only: &[String],
    ) -> Result<Vec<PlannedTable>> {
        let names = if tables.include.is_empty() {
            let listed = self.source.list_tables().await?;
            debug!(tables = listed.len(), "discovered source tables");
            listed
        } else {
            tables.include.clone()
        };

        let selected: Vec<String> = names
            .into_iter()
            .filter(|t| !tables.exclude.contains(t))
            .filter(|t| only.is_empty() || only.contains(t))
            .collect();
        for name in only.iter().filter(|n| !selected.contains(n)) {
            warn!(table = %name, "requested table is not part of the configured selection");
        }

        let mut planned = Vec::with_capacity(selected.len());
        for name in selected {
            let overrides = tables.override_for(&name);
            let source = TableName(name.clone());
            let target = TableName(
                overrides
                    .and_then(|o| o.target_name.clone())
                    .unwrap_or_else(|| name.clone()),
            );
            let ignored = match overrides {
                Some(o) => global_ignored.union(&o.ignored_columns),
                None => global_ignored.clone(),
            };
            let key = overrides.map(|o| o.key.as_slice());
            let spec = self.resolve(&source, &target, &ignored, key).await;
            if let Ok(spec) = &spec {
                for note in &spec.warnings {
                    warn!(table = %source, "{}", note);
                }
            }
            planned.push(PlannedTable {
                source,
                target,
                spec,
            });
        }
        Ok(planned)
    }

    async fn resolve(
        &self,
        source: &TableName,
        target: &TableName,
        ignored: &IgnoredColumns,
        key: Option<&[String]>,
    ) -> Result<TableSpec> {
        let (source_shape, target_shape) = tokio::join!(
            self.source.describe_table(source),
            self.target.describe_table(target)
        );
        let source_shape = source_shape?.ok_or_else(|| ReconcileError::TableNotFound {
            table: source.0.clone(),
            side: Side::Source,
        })?;
        let target_shape = target_shape?.ok_or_else(|| ReconcileError::TableNotFound {
            table: target.0.clone(),
            side: Side::Target,
        })?;
        TableSpec::resolve(
            source.clone(),
            target.clone(),
            &source_shape,
            &target_shape,
            ignored,
            key,
        )
    }
}
