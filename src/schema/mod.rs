//! Schema model for FK-aware cleaning.
//!
//! This module provides:
//! - Table identity (`TableName`) and arena indices (`TableId`)
//! - Foreign key edges between introspected tables
//! - Dependency graph construction with cycle-aware clear planning

mod builder;
mod graph;
mod scc;

pub use builder::*;
pub use graph::*;

use ahash::AHashMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Unique identifier for a table within a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl TableId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// A table name, optionally qualified by a schema (namespace).
///
/// Ordering is by schema, then name; unqualified names sort first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// Create an unqualified table name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Create a schema-qualified table name
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parse `schema.table` or `table`
    pub fn parse(s: &str) -> Self {
        match s.trim().split_once('.') {
            Some((schema, name)) => Self::qualified(schema.trim(), name.trim()),
            None => Self::new(s.trim()),
        }
    }

    /// Check whether a filter entry names this table (case-insensitive).
    ///
    /// A bare entry (`users`) matches the table in any schema, a qualified
    /// entry (`public.users`) only the table in that schema.
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = TableName::parse(pattern);
        if !pattern.name.eq_ignore_ascii_case(&self.name) {
            return false;
        }
        match (&pattern.schema, &self.schema) {
            (None, _) => true,
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Serialize for TableName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        TableName::parse(s)
    }
}

/// Foreign key relationship between two introspected tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    /// Table holding the FK column(s)
    pub dependent: TableId,
    /// Table the FK points at
    pub referenced: TableId,
    /// Dependent and referenced are the same table
    pub self_reference: bool,
    /// Backend reports ON DELETE CASCADE
    pub cascade_delete: bool,
    /// Backend reports the constraint as DEFERRABLE
    pub deferrable: bool,
}

/// Introspected database schema: an arena of tables plus the FK edges between them.
///
/// Tables are sorted by name and unique, so `TableId`s are stable for a given
/// table set regardless of the order the catalog returned them in.
#[derive(Debug, Default)]
pub struct Schema {
    tables: Vec<TableName>,
    lookup: AHashMap<TableName, TableId>,
    edges: Vec<ForeignKeyEdge>,
    /// FKs from tables outside the arena into arena tables
    external: Vec<(TableName, TableId)>,
    /// FKs from arena tables whose target no catalog row named
    unresolved: Vec<(TableName, TableName)>,
    protected: Vec<TableName>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the table name for an ID
    pub fn table(&self, id: TableId) -> Option<&TableName> {
        self.tables.get(id.index())
    }

    /// Get table ID by exact name
    pub fn get_table_id(&self, name: &TableName) -> Option<TableId> {
        self.lookup.get(name).copied()
    }

    /// Find all tables a filter entry refers to (see [`TableName::matches`])
    pub fn find(&self, pattern: &str) -> Vec<TableId> {
        self.iter()
            .filter(|(_, t)| t.matches(pattern))
            .map(|(id, _)| id)
            .collect()
    }

    /// All FK edges, deduplicated
    pub fn edges(&self) -> &[ForeignKeyEdge] {
        &self.edges
    }

    /// Tables outside the arena (other schemas, protected tables) that hold an
    /// FK referencing `id`
    pub fn external_dependents(&self, id: TableId) -> impl Iterator<Item = &TableName> {
        self.external
            .iter()
            .filter(move |(_, referenced)| *referenced == id)
            .map(|(dependent, _)| dependent)
    }

    /// `(dependent, referenced)` pairs whose referenced table is neither an
    /// arena table nor a protected one
    pub fn unresolved_foreign_keys(&self) -> &[(TableName, TableName)] {
        &self.unresolved
    }

    /// Bookkeeping tables that were discovered but are never cleared
    pub fn protected(&self) -> &[TableName] {
        &self.protected
    }

    /// Get the number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if schema is empty
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterate over all tables with their IDs
    pub fn iter(&self) -> impl Iterator<Item = (TableId, &TableName)> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, t)| (TableId(i as u32), t))
    }

    /// All table IDs
    pub fn ids(&self) -> impl Iterator<Item = TableId> {
        (0..self.tables.len() as u32).map(TableId)
    }
}
