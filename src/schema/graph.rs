//! Schema dependency graph and clear planning.
//!
//! Provides:
//! - Dependency graph construction from introspected FK edges
//! - Batched topological ordering (dependents before the tables they reference)
//! - Cycle detection, with cyclic groups condensed into single clear units

use super::scc::strongly_connected;
use super::{Schema, TableId, TableName};
use ahash::AHashSet;
use serde::Serialize;
use std::collections::VecDeque;

/// Schema dependency graph built from foreign key relationships.
///
/// The graph represents parent → child relationships where:
/// - A parent is a table referenced by another table's FK
/// - A child is a table that has an FK referencing another table
///
/// Rows are cleared children first: a parent row cannot go while a child row
/// still points at it.
#[derive(Debug)]
pub struct DependencyGraph {
    schema: Schema,
    /// For each table, tables it references (self-references excluded)
    parents: Vec<Vec<TableId>>,
    /// For each table, tables that reference it (self-references excluded)
    children: Vec<Vec<TableId>>,
    self_referencing: Vec<bool>,
}

/// The set of tables a clean is allowed to modify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    members: Vec<bool>,
}

impl Scope {
    /// Every table of a schema with `len` tables
    pub fn all(len: usize) -> Self {
        Self {
            members: vec![true; len],
        }
    }

    /// No table of a schema with `len` tables
    pub fn none(len: usize) -> Self {
        Self {
            members: vec![false; len],
        }
    }

    pub fn insert(&mut self, id: TableId) {
        if let Some(m) = self.members.get_mut(id.index()) {
            *m = true;
        }
    }

    pub fn remove(&mut self, id: TableId) {
        if let Some(m) = self.members.get_mut(id.index()) {
            *m = false;
        }
    }

    pub fn contains(&self, id: TableId) -> bool {
        self.members.get(id.index()).copied().unwrap_or(false)
    }

    /// Number of tables in scope
    pub fn len(&self) -> usize {
        self.members.iter().filter(|&&m| m).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.members.iter().any(|&m| m)
    }

    /// In-scope table IDs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = TableId> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| TableId(i as u32))
    }
}

/// One step of a clear plan: a single table, or a group of tables that
/// reference each other and must be cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearUnit {
    /// Tables in this unit, sorted by name
    pub tables: Vec<TableName>,
    /// Part of an FK cycle (includes a lone self-referencing table)
    pub cyclic: bool,
    /// Every FK inside a cyclic unit is DEFERRABLE
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deferrable: bool,
}

impl ClearUnit {
    /// A lone table whose only cycle is a reference to itself
    pub fn is_self_reference(&self) -> bool {
        self.cyclic && self.tables.len() == 1
    }
}

/// Units with no ordering relationship to each other
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearBatch {
    pub units: Vec<ClearUnit>,
}

impl ClearBatch {
    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.units.iter().flat_map(|u| u.tables.iter())
    }
}

/// Safe order in which to clear tables.
///
/// Every batch must complete before the next one starts; units within a batch
/// may run in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearPlan {
    pub batches: Vec<ClearBatch>,
}

impl ClearPlan {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// All tables in execution order
    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.batches.iter().flat_map(|b| b.tables())
    }

    pub fn table_count(&self) -> usize {
        self.tables().count()
    }

    pub fn units(&self) -> impl Iterator<Item = &ClearUnit> {
        self.batches.iter().flat_map(|b| b.units.iter())
    }

    pub fn cyclic_units(&self) -> impl Iterator<Item = &ClearUnit> {
        self.units().filter(|u| u.cyclic)
    }

    /// Position of a table in execution order
    pub fn position(&self, table: &TableName) -> Option<usize> {
        self.tables().position(|t| t == table)
    }
}

impl DependencyGraph {
    /// Build a dependency graph from an introspected schema
    pub fn new(schema: Schema) -> Self {
        let n = schema.len();
        let mut parents: Vec<Vec<TableId>> = vec![Vec::new(); n];
        let mut children: Vec<Vec<TableId>> = vec![Vec::new(); n];
        let mut self_referencing = vec![false; n];

        // Edges are deduplicated by the schema builder
        for edge in schema.edges() {
            if edge.self_reference {
                self_referencing[edge.dependent.index()] = true;
            } else {
                parents[edge.dependent.index()].push(edge.referenced);
                children[edge.referenced.index()].push(edge.dependent);
            }
        }

        Self {
            schema,
            parents,
            children,
            self_referencing,
        }
    }

    /// The underlying schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get the number of tables in the graph
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    /// Get the table name for a table ID
    pub fn table_name(&self, id: TableId) -> Option<&TableName> {
        self.schema.table(id)
    }

    /// Check if a table has a self-referential FK
    pub fn has_self_reference(&self, id: TableId) -> bool {
        self.self_referencing.get(id.index()).copied().unwrap_or(false)
    }

    /// Tables `id` references (excluding itself)
    pub fn parents(&self, id: TableId) -> &[TableId] {
        &self.parents[id.index()]
    }

    /// Tables referencing `id` (excluding itself)
    pub fn children(&self, id: TableId) -> &[TableId] {
        &self.children[id.index()]
    }

    /// Build the clear plan over the tables in `scope`.
    ///
    /// Strongly connected components of the in-scope subgraph are condensed
    /// into single units, then ordered level by level with Kahn's algorithm:
    /// batch 0 holds units no in-scope table references, each later batch
    /// holds units whose in-scope dependents are all in earlier batches.
    /// Units are sorted by their first table name, so the result does not
    /// depend on catalog order.
    pub fn clear_plan(&self, scope: &Scope) -> ClearPlan {
        let n = self.len();
        let in_scope: Vec<bool> = (0..n).map(|i| scope.contains(TableId(i as u32))).collect();

        let components = strongly_connected(&self.parents, &in_scope);
        if components.is_empty() {
            return ClearPlan::default();
        }

        let mut component_of = vec![usize::MAX; n];
        for (c, members) in components.iter().enumerate() {
            for id in members {
                component_of[id.index()] = c;
            }
        }

        // Condensed edges: dependent component must be cleared before referenced component
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        let mut in_degree = vec![0usize; components.len()];
        let mut seen: AHashSet<(usize, usize)> = AHashSet::new();
        for (child, parents) in self.parents.iter().enumerate() {
            if !in_scope[child] {
                continue;
            }
            for parent in parents {
                if !in_scope[parent.index()] {
                    continue;
                }
                let from = component_of[child];
                let to = component_of[parent.index()];
                if from != to && seen.insert((from, to)) {
                    successors[from].push(to);
                    in_degree[to] += 1;
                }
            }
        }

        // Components are sorted internally, so the first member is the smallest name
        let first = |c: usize| components[c][0];

        let mut level: Vec<usize> = (0..components.len())
            .filter(|&c| in_degree[c] == 0)
            .collect();
        let mut batches = Vec::new();

        while !level.is_empty() {
            level.sort_by_key(|&c| first(c));

            let mut next = Vec::new();
            for &c in &level {
                for &s in &successors[c] {
                    in_degree[s] -= 1;
                    if in_degree[s] == 0 {
                        next.push(s);
                    }
                }
            }

            batches.push(ClearBatch {
                units: level.iter().map(|&c| self.unit(&components[c])).collect(),
            });
            level = next;
        }

        ClearPlan { batches }
    }

    fn unit(&self, members: &[TableId]) -> ClearUnit {
        let cyclic = members.len() > 1 || self.has_self_reference(members[0]);
        let deferrable = cyclic
            && self
                .schema
                .edges()
                .iter()
                .filter(|e| {
                    members.binary_search(&e.dependent).is_ok()
                        && members.binary_search(&e.referenced).is_ok()
                })
                .all(|e| e.deferrable);

        ClearUnit {
            tables: members
                .iter()
                .filter_map(|&id| self.table_name(id).cloned())
                .collect(),
            cyclic,
            deferrable,
        }
    }

    /// Minimal set of in-scope tables whose cascading clear reaches every
    /// in-scope table.
    ///
    /// These are the in-scope tables that reference no other in-scope table.
    /// A cycle with no in-scope references leaving it contributes its first
    /// member, since the other members reach it through the cycle.
    pub fn cascade_roots(&self, scope: &Scope) -> Vec<TableId> {
        let n = self.len();
        let in_scope: Vec<bool> = (0..n).map(|i| scope.contains(TableId(i as u32))).collect();
        let components = strongly_connected(&self.parents, &in_scope);

        let mut roots: Vec<TableId> = components
            .iter()
            .filter(|members| {
                members.iter().all(|&id| {
                    self.parents(id)
                        .iter()
                        .all(|p| !scope.contains(*p) || members.contains(p))
                })
            })
            .map(|members| members[0])
            .collect();
        roots.sort();
        roots
    }

    /// Get all descendant tables of a given table (tables that depend on it)
    pub fn descendants(&self, id: TableId) -> Vec<TableId> {
        let mut descendants = Vec::new();
        let mut visited = vec![false; self.len()];
        let mut queue = VecDeque::new();

        visited[id.index()] = true;
        for &child in &self.children[id.index()] {
            queue.push_back(child);
            visited[child.index()] = true;
        }

        while let Some(current) = queue.pop_front() {
            descendants.push(current);
            for &child in &self.children[current.index()] {
                if !visited[child.index()] {
                    visited[child.index()] = true;
                    queue.push_back(child);
                }
            }
        }

        descendants
    }

    /// Tables a cascading clear of `roots` would reach that lie outside
    /// `scope`, including tables outside the introspected set.
    pub fn cascade_escapes(&self, roots: &[TableId], scope: &Scope) -> Vec<TableName> {
        let mut reached: Vec<TableId> = roots.to_vec();
        for &root in roots {
            reached.extend(self.descendants(root));
        }
        reached.sort();
        reached.dedup();

        let mut escapes: Vec<TableName> = Vec::new();
        for &id in &reached {
            if !scope.contains(id) {
                escapes.extend(self.table_name(id).cloned());
            }
            escapes.extend(self.schema.external_dependents(id).cloned());
        }
        escapes.sort();
        escapes.dedup();
        escapes
    }

    /// Tables outside `scope` holding FKs into in-scope tables.
    ///
    /// If any of these has rows, clearing the referenced table will fail.
    pub fn outside_dependents(&self, scope: &Scope) -> Vec<TableName> {
        self.dependents_outside(scope.iter(), scope)
    }

    /// Tables outside `scope` holding FKs into any of `tables`
    pub fn dependents_outside(
        &self,
        tables: impl IntoIterator<Item = TableId>,
        scope: &Scope,
    ) -> Vec<TableName> {
        let mut outside: Vec<TableName> = Vec::new();
        for id in tables {
            for &child in self.children(id) {
                if !scope.contains(child) {
                    outside.extend(self.table_name(child).cloned());
                }
            }
            outside.extend(self.schema.external_dependents(id).cloned());
        }
        outside.sort();
        outside.dedup();
        outside
    }
}
