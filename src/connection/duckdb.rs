//! DuckDB implementation of the connection capability.

use super::{Connection, ConnectionError, ConnectionPool, Row, StatementResult};
use crate::backend::BackendKind;
use ::duckdb::types::ValueRef;
use std::path::Path;
use std::sync::Mutex;
use tracing::trace;

/// Connection to an embedded DuckDB database
pub struct DuckDbConnection {
    conn: ::duckdb::Connection,
}

impl DuckDbConnection {
    /// Open (or create) a database file; `:memory:` opens an in-memory database
    pub fn open(path: &Path) -> Result<Self, ConnectionError> {
        let conn = if path.as_os_str() == ":memory:" {
            ::duckdb::Connection::open_in_memory()?
        } else {
            ::duckdb::Connection::open(path)?
        };
        Ok(Self { conn })
    }

    /// Open a fresh in-memory database
    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        Ok(Self {
            conn: ::duckdb::Connection::open_in_memory()?,
        })
    }

    /// Another connection to the same database
    pub fn try_clone(&self) -> Result<Self, ConnectionError> {
        Ok(Self {
            conn: self.conn.try_clone()?,
        })
    }

    /// Get the underlying DuckDB connection (for seeding test data)
    pub fn inner(&self) -> &::duckdb::Connection {
        &self.conn
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut result = stmt.query([])?;

        let mut rows: Vec<Row> = Vec::new();
        let mut column_count = 0;

        while let Some(row) = result.next()? {
            if column_count == 0 {
                column_count = row.as_ref().column_count();
            }

            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(render_value(row.get_ref(i)?));
            }
            rows.push(values);
        }

        Ok(rows)
    }
}

impl Connection for DuckDbConnection {
    fn execute(&mut self, sql: &str) -> Result<StatementResult, ConnectionError> {
        trace!(sql, "duckdb execute");
        if returns_rows(sql) {
            Ok(StatementResult::rows(self.query(sql)?))
        } else {
            let affected = self.conn.execute(sql, [])?;
            Ok(StatementResult::affected(affected as u64))
        }
    }

    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        Some(BackendKind::DuckDb)
    }
}

/// Hands out connections to one DuckDB database, for concurrent clearing
pub struct DuckDbPool {
    root: Mutex<DuckDbConnection>,
}

impl DuckDbPool {
    pub fn new(conn: DuckDbConnection) -> Self {
        Self {
            root: Mutex::new(conn),
        }
    }
}

impl ConnectionPool for DuckDbPool {
    type Conn = DuckDbConnection;

    fn acquire(&self) -> Result<DuckDbConnection, ConnectionError> {
        let root = self
            .root
            .lock()
            .map_err(|_| ConnectionError::message("duckdb pool lock poisoned"))?;
        root.try_clone()
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        Some(BackendKind::DuckDb)
    }
}

/// Statements whose result is a row set rather than an affected-row count
fn returns_rows(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    ["SELECT", "WITH", "FROM", "SHOW", "DESCRIBE", "PRAGMA", "VALUES"]
        .iter()
        .any(|kw| first.eq_ignore_ascii_case(kw))
}

fn render_value(value: ValueRef<'_>) -> Option<String> {
    let rendered = match value {
        ValueRef::Null => return None,
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(n) => n.to_string(),
        ValueRef::SmallInt(n) => n.to_string(),
        ValueRef::Int(n) => n.to_string(),
        ValueRef::BigInt(n) => n.to_string(),
        ValueRef::HugeInt(n) => n.to_string(),
        ValueRef::UTinyInt(n) => n.to_string(),
        ValueRef::USmallInt(n) => n.to_string(),
        ValueRef::UInt(n) => n.to_string(),
        ValueRef::UBigInt(n) => n.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => d.to_string(),
        ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
        other => format!("{:?}", other),
    };
    Some(rendered)
}
