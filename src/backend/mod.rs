//! Backend adapters: per-engine catalog queries and clearing SQL.
//!
//! Each supported engine implements [`Backend`]:
//! - `postgres`: pg_catalog introspection, multi-table `TRUNCATE ... CASCADE`
//! - `mysql`: information_schema introspection, `FOREIGN_KEY_CHECKS` toggle
//! - `sqlite`: sqlite_master + `pragma_foreign_key_list`, no `TRUNCATE`
//! - `duckdb`: `duckdb_tables()` / `duckdb_constraints()` introspection
//!
//! The introspector and strategy executor are parameterised over a backend
//! rather than branching on the engine themselves.

mod duckdb;
mod mysql;
mod postgres;
mod sqlite;

pub use self::duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use crate::schema::TableName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    MySql,
    Sqlite,
    DuckDb,
}

impl BackendKind {
    /// The adapter for this engine
    pub fn backend(self) -> &'static dyn Backend {
        match self {
            BackendKind::Postgres => &Postgres,
            BackendKind::MySql => &MySql,
            BackendKind::Sqlite => &Sqlite,
            BackendKind::DuckDb => &DuckDb,
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            "mysql" | "mariadb" => Ok(BackendKind::MySql),
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            "duckdb" => Ok(BackendKind::DuckDb),
            _ => Err(format!(
                "Unknown backend: {}. Valid options: postgres, mysql, sqlite, duckdb",
                s
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Postgres => write!(f, "postgres"),
            BackendKind::MySql => write!(f, "mysql"),
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// What an engine can do when clearing tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// FK checks run at end of statement, so one `DELETE` can clear a
    /// self-referencing table
    pub statement_level_fk_checks: bool,
    /// `SET CONSTRAINTS ALL DEFERRED` postpones DEFERRABLE FK checks to commit
    pub deferrable_constraints: bool,
    /// One `TRUNCATE` statement may clear tables that reference each other
    pub multi_table_truncate: bool,
    /// `TRUNCATE ... CASCADE` clears dependents too
    pub truncate_cascade: bool,
    /// Truncate can reset identity/auto-increment counters
    pub restart_identity: bool,
    /// `TRUNCATE` refuses any table referenced by an FK unless checks are off
    pub truncate_requires_toggle: bool,
}

/// Options for a truncate statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncateOptions {
    pub restart_identity: bool,
    pub cascade: bool,
}

/// Engine-specific SQL used by the introspector and strategy executor.
///
/// Catalog queries must return rows in these shapes:
/// - tables: `(schema, table)`; schema may be NULL
/// - foreign keys: `(dep_schema, dep_table, ref_schema, ref_table, delete_rule, deferrable)`
pub trait Backend: fmt::Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    /// Query listing user tables, optionally restricted to one schema
    fn list_tables_sql(&self, schema: Option<&str>) -> String;

    /// Query listing foreign keys across all user schemas
    fn list_foreign_keys_sql(&self) -> String;

    /// Engine-internal tables that slip past the catalog query
    fn is_system_table(&self, _table: &TableName) -> bool {
        false
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn qualified_name(&self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(&table.name)
            ),
            None => self.quote_ident(&table.name),
        }
    }

    fn delete_sql(&self, table: &TableName) -> String {
        format!("DELETE FROM {}", self.qualified_name(table))
    }

    /// Statements that bulk-clear `tables`
    fn truncate_sql(&self, tables: &[TableName], options: TruncateOptions) -> Vec<String>;

    /// Statement deferring DEFERRABLE constraints for the current transaction
    fn defer_constraints_sql(&self) -> Option<&'static str> {
        None
    }

    /// Session statements that disable and re-enable FK checks
    fn constraint_toggle(&self) -> Option<(&'static str, &'static str)> {
        None
    }
}

/// Quote a string literal for embedding in a catalog query
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
