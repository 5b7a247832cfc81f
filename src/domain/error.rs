//! Error taxonomy for reconciliation.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::domain::value_objects::Side;

/// Errors raised while reconciling a single table.
///
/// All of them are caught at the table-task boundary and recorded in the run
/// report; none of them aborts the run as a whole.
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// Transient connectivity failure. Retried with backoff before surfacing.
    #[error("connection error on {side} ({context}): {message}")]
    Connection {
        side: Side,
        context: String,
        message: String,
    },

    /// A query failed for a non-transient reason.
    #[error("query failed on {side} ({context}): {message}")]
    Query {
        side: Side,
        context: String,
        message: String,
    },

    /// A non-ignored column is absent on one side, or the key definitions
    /// disagree. Deterministic, never retried.
    #[error("schema mismatch in table {table}: {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("table {table} not found in {side}")]
    TableNotFound { table: String, side: Side },

    /// Fix generation requested for a table without an identifying key.
    /// Recorded as a note, not as a failure.
    #[error("table {0} has no identifying key, fix statements skipped")]
    UnsupportedFixTarget(String),

    #[error("reconciliation of {0} was cancelled")]
    Cancelled(String),

    #[error("reconciliation of {table} exceeded its {budget:?} budget")]
    Timeout { table: String, budget: Duration },
}

/// Serializable classification of a [`ReconcileError`], used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Query,
    SchemaMismatch,
    TableNotFound,
    UnsupportedFixTarget,
    Cancelled,
    Timeout,
}

impl ReconcileError {
    pub fn connection(side: Side, context: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Connection {
            side,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn query(side: Side, context: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Query {
            side,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn schema(table: impl Into<String>, detail: impl Into<String>) -> Self {
        ReconcileError::SchemaMismatch {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// Only connectivity failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Connection { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Connection { .. } => ErrorKind::Connection,
            ReconcileError::Query { .. } => ErrorKind::Query,
            ReconcileError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            ReconcileError::TableNotFound { .. } => ErrorKind::TableNotFound,
            ReconcileError::UnsupportedFixTarget(_) => ErrorKind::UnsupportedFixTarget,
            ReconcileError::Cancelled(_) => ErrorKind::Cancelled,
            ReconcileError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
