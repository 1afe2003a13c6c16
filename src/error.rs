//! Errors reported by the cleaning engine.

use crate::config::Strategy;
use crate::connection::ConnectionError;
use crate::schema::TableName;
use serde::Serialize;
use std::fmt;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configuration,
    Introspection,
    Ordering,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Configuration => write!(f, "configuration"),
            Stage::Introspection => write!(f, "introspection"),
            Stage::Ordering => write!(f, "ordering"),
            Stage::Execution => write!(f, "execution"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("schema introspection failed: {source}")]
    Introspection {
        #[source]
        source: ConnectionError,
    },

    #[error(
        "cannot {strategy} cyclic tables {} safely on this backend",
        join_tables(.tables)
    )]
    UnresolvableDependency {
        tables: Vec<TableName>,
        strategy: Strategy,
    },

    #[error("failed to clear table {table}: {source}")]
    ClearExecution {
        table: TableName,
        #[source]
        source: ConnectionError,
    },

    #[error("failed to {action} transaction: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: ConnectionError,
    },

    #[error("cancelled after clearing {} table(s)", .cleared.len())]
    Cancelled { cleared: Vec<TableName> },
}

impl CleanError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CleanError::Configuration(msg.into())
    }

    /// Which pipeline stage failed
    pub fn stage(&self) -> Stage {
        match self {
            CleanError::Configuration(_) => Stage::Configuration,
            CleanError::Introspection { .. } => Stage::Introspection,
            CleanError::UnresolvableDependency { .. } => Stage::Ordering,
            CleanError::ClearExecution { .. }
            | CleanError::Transaction { .. }
            | CleanError::Cancelled { .. } => Stage::Execution,
        }
    }
}

fn join_tables(tables: &[TableName]) -> String {
    tables
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
