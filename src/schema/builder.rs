//! Schema construction from catalog rows.

use super::{ForeignKeyEdge, Schema, TableId, TableName};
use ahash::AHashMap;
use tracing::{debug, warn};

/// Foreign key as reported by a catalog, before resolution to table IDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub dependent: TableName,
    pub referenced: TableName,
    pub cascade_delete: bool,
    pub deferrable: bool,
}

impl ForeignKeyRef {
    pub fn new(dependent: impl Into<TableName>, referenced: impl Into<TableName>) -> Self {
        Self {
            dependent: dependent.into(),
            referenced: referenced.into(),
            cascade_delete: false,
            deferrable: false,
        }
    }

    pub fn cascade(mut self, cascade_delete: bool) -> Self {
        self.cascade_delete = cascade_delete;
        self
    }

    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = deferrable;
        self
    }
}

/// Builder for constructing a [`Schema`] from introspected tables and FKs
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableName>,
    foreign_keys: Vec<ForeignKeyRef>,
    protected: Vec<TableName>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an application table
    pub fn table(mut self, name: impl Into<TableName>) -> Self {
        self.add_table(name.into());
        self
    }

    /// Add a foreign key `dependent -> referenced`
    pub fn foreign_key(mut self, dependent: impl Into<TableName>, referenced: impl Into<TableName>) -> Self {
        self.add_foreign_key(ForeignKeyRef::new(dependent, referenced));
        self
    }

    pub fn add_table(&mut self, name: TableName) {
        self.tables.push(name);
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKeyRef) {
        self.foreign_keys.push(fk);
    }

    /// Record a bookkeeping table that exists but must never be cleared
    pub fn add_protected(&mut self, name: TableName) {
        self.protected.push(name);
    }

    /// Build the schema.
    ///
    /// Tables are sorted and deduplicated. FKs pointing at tables outside the
    /// table set are dropped. Multiple constraints between the same pair of
    /// tables collapse into one edge, which is only cascading/deferrable when
    /// every constraint is.
    pub fn build(mut self) -> Schema {
        self.tables.sort();
        self.tables.dedup();
        self.protected.sort();
        self.protected.dedup();

        let lookup: AHashMap<TableName, TableId> = self
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), TableId(i as u32)))
            .collect();

        let mut merged: AHashMap<(TableId, TableId), ForeignKeyEdge> = AHashMap::new();
        let mut external: Vec<(TableName, TableId)> = Vec::new();
        let mut unresolved: Vec<(TableName, TableName)> = Vec::new();
        for fk in &self.foreign_keys {
            let (Some(&dependent), Some(&referenced)) =
                (lookup.get(&fk.dependent), lookup.get(&fk.referenced))
            else {
                match (lookup.get(&fk.dependent), lookup.get(&fk.referenced)) {
                    (None, Some(&referenced)) => {
                        external.push((fk.dependent.clone(), referenced));
                    }
                    (Some(_), None) if self.protected.binary_search(&fk.referenced).is_err() => {
                        warn!(
                            dependent = %fk.dependent,
                            referenced = %fk.referenced,
                            "foreign key target not found among introspected tables"
                        );
                        unresolved.push((fk.dependent.clone(), fk.referenced.clone()));
                        continue;
                    }
                    _ => {}
                }
                debug!(
                    dependent = %fk.dependent,
                    referenced = %fk.referenced,
                    "ignoring foreign key outside the introspected table set"
                );
                continue;
            };

            merged
                .entry((dependent, referenced))
                .and_modify(|edge| {
                    edge.cascade_delete &= fk.cascade_delete;
                    edge.deferrable &= fk.deferrable;
                })
                .or_insert(ForeignKeyEdge {
                    dependent,
                    referenced,
                    self_reference: dependent == referenced,
                    cascade_delete: fk.cascade_delete,
                    deferrable: fk.deferrable,
                });
        }

        let mut edges: Vec<ForeignKeyEdge> = merged.into_values().collect();
        edges.sort_by_key(|e| (e.dependent, e.referenced));
        external.sort();
        external.dedup();
        unresolved.sort();
        unresolved.dedup();

        Schema {
            tables: self.tables,
            lookup,
            edges,
            external,
            unresolved,
            protected: self.protected,
        }
    }
}
