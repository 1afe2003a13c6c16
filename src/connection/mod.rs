//! Connection capability consumed by the cleaning engine.
//!
//! The engine never talks to a database directly: every catalog query and
//! clearing statement goes through [`Connection`]. Drivers implement the
//! trait; [`DuckDbConnection`] is bundled.

mod duckdb;

pub use self::duckdb::{DuckDbConnection, DuckDbPool};

use crate::backend::BackendKind;

/// A single result row; `None` is SQL NULL
pub type Row = Vec<Option<String>>;

/// Outcome of executing one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementResult {
    /// Rows inserted, updated or deleted (0 for queries and DDL)
    pub rows_affected: u64,
    /// Rows returned by a query
    pub rows: Vec<Row>,
}

impl StatementResult {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            rows: Vec::new(),
        }
    }

    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows_affected: 0,
            rows,
        }
    }
}

/// Error reported by a connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ConnectionError {
    pub fn message(msg: impl Into<String>) -> Self {
        ConnectionError::Message(msg.into())
    }
}

/// Database connection capability.
///
/// `execute` runs one statement and reports rows affected and rows returned.
/// Transaction control is scoped to this connection.
pub trait Connection {
    /// Execute a single statement
    fn execute(&mut self, sql: &str) -> Result<StatementResult, ConnectionError>;

    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        self.execute("BEGIN TRANSACTION").map(|_| ())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.execute("ROLLBACK").map(|_| ())
    }

    /// The database engine behind this connection, if the driver knows it
    fn backend_kind(&self) -> Option<BackendKind> {
        None
    }
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn execute(&mut self, sql: &str) -> Result<StatementResult, ConnectionError> {
        (**self).execute(sql)
    }

    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        (**self).begin_transaction()
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        (**self).rollback()
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        (**self).backend_kind()
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&mut self, sql: &str) -> Result<StatementResult, ConnectionError> {
        (**self).execute(sql)
    }

    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        (**self).begin_transaction()
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        (**self).rollback()
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        (**self).backend_kind()
    }
}

/// Source of independent connections to the same database.
///
/// Needed to clear the units of one batch concurrently; a single connection
/// cannot run statements in parallel.
pub trait ConnectionPool: Sync {
    type Conn: Connection + Send;

    fn acquire(&self) -> Result<Self::Conn, ConnectionError>;

    fn backend_kind(&self) -> Option<BackendKind> {
        None
    }
}
