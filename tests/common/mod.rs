//! In-memory stand-in for a relational database.
//!
//! `SimDatabase` implements `Connection` and understands exactly the SQL the
//! cleaner emits for a backend: its catalog queries, `DELETE FROM`,
//! `TRUNCATE`, transaction control, `SET CONSTRAINTS ALL DEFERRED` and the
//! FK-check toggles. Foreign keys are enforced the way the simulated engine
//! would: immediately after each statement, or at commit when deferred.

#![allow(dead_code)]

use db_cleaner::{
    Backend, BackendKind, Connection, ConnectionError, ConnectionPool, StatementResult, TableName,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Row {
    id: u64,
    refs: Vec<(TableName, u64)>,
}

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<Row>,
    next_id: u64,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Clone)]
struct ForeignKey {
    dependent: TableName,
    referenced: TableName,
    deferrable: bool,
}

pub struct SimDatabase {
    kind: BackendKind,
    report_kind: bool,
    tables: BTreeMap<TableName, Table>,
    foreign_keys: Vec<ForeignKey>,
    fk_checks: bool,
    deferred: bool,
    snapshot: Option<BTreeMap<TableName, Table>>,
    fail_on: Option<String>,
    /// Every statement received, in order
    pub log: Vec<String>,
}

impl SimDatabase {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            report_kind: true,
            tables: BTreeMap::new(),
            foreign_keys: Vec::new(),
            fk_checks: true,
            deferred: false,
            snapshot: None,
            fail_on: None,
            log: Vec::new(),
        }
    }

    pub fn postgres() -> Self {
        Self::new(BackendKind::Postgres)
    }

    pub fn mysql() -> Self {
        Self::new(BackendKind::MySql)
    }

    pub fn sqlite() -> Self {
        Self::new(BackendKind::Sqlite)
    }

    /// Stop reporting the backend kind through `Connection::backend_kind`
    pub fn anonymous(mut self) -> Self {
        self.report_kind = false;
        self
    }

    pub fn table(mut self, name: &str) -> Self {
        self.tables.insert(TableName::parse(name), Table::default());
        self
    }

    pub fn foreign_key(self, dependent: &str, referenced: &str) -> Self {
        self.add_fk(dependent, referenced, false)
    }

    pub fn deferrable_foreign_key(self, dependent: &str, referenced: &str) -> Self {
        self.add_fk(dependent, referenced, true)
    }

    fn add_fk(mut self, dependent: &str, referenced: &str, deferrable: bool) -> Self {
        self.foreign_keys.push(ForeignKey {
            dependent: TableName::parse(dependent),
            referenced: TableName::parse(referenced),
            deferrable,
        });
        self
    }

    /// Fail any statement containing `fragment`
    pub fn fail_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    /// Insert a row referencing `(table, id)` pairs; returns the new id
    pub fn insert(&mut self, table: &str, refs: &[(&str, u64)]) -> u64 {
        let name = TableName::parse(table);
        let refs: Vec<(TableName, u64)> = refs
            .iter()
            .map(|(t, id)| (TableName::parse(t), *id))
            .collect();
        let table = self
            .tables
            .get_mut(&name)
            .unwrap_or_else(|| panic!("no table {}", name));
        let id = table.next_id;
        table.next_id += 1;
        table.rows.push(Row { id, refs });
        id
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables[&TableName::parse(table)].rows.len()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }

    pub fn next_id(&self, table: &str) -> u64 {
        self.tables[&TableName::parse(table)].next_id
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn fk_checks_enabled(&self) -> bool {
        self.fk_checks
    }

    /// Statements that cleared data, in order
    pub fn clearing_statements(&self) -> Vec<&str> {
        self.log
            .iter()
            .map(String::as_str)
            .filter(|s| s.starts_with("DELETE") || s.starts_with("TRUNCATE"))
            .collect()
    }

    /// Index in `log` of the `DELETE` that cleared `table`
    pub fn delete_position(&self, table: &str) -> Option<usize> {
        let sql = self.backend().delete_sql(&TableName::parse(table));
        self.log.iter().position(|s| *s == sql)
    }

    fn backend(&self) -> &'static dyn Backend {
        self.kind.backend()
    }

    fn error(msg: impl Into<String>) -> ConnectionError {
        ConnectionError::message(msg)
    }

    fn catalog_tables(&self, sql: &str) -> Option<Vec<Vec<Option<String>>>> {
        let backend = self.backend();
        let mut filters: Vec<Option<String>> = vec![None];
        filters.extend(self.tables.keys().filter_map(|t| t.schema.clone()).map(Some));

        let filter = filters
            .into_iter()
            .find(|f| backend.list_tables_sql(f.as_deref()) == sql)?;
        Some(
            self.tables
                .keys()
                .filter(|t| filter.is_none() || t.schema == filter)
                .map(|t| vec![t.schema.clone(), Some(t.name.clone())])
                .collect(),
        )
    }

    fn catalog_foreign_keys(&self) -> Vec<Vec<Option<String>>> {
        self.foreign_keys
            .iter()
            .map(|fk| {
                vec![
                    fk.dependent.schema.clone(),
                    Some(fk.dependent.name.clone()),
                    fk.referenced.schema.clone(),
                    Some(fk.referenced.name.clone()),
                    Some("NO ACTION".to_string()),
                    Some(if fk.deferrable { "true" } else { "false" }.to_string()),
                ]
            })
            .collect()
    }

    fn resolve(&self, quoted: &str) -> Result<TableName, ConnectionError> {
        let backend = self.backend();
        self.tables
            .keys()
            .find(|t| backend.qualified_name(t) == quoted.trim())
            .cloned()
            .ok_or_else(|| Self::error(format!("relation {} does not exist", quoted)))
    }

    fn is_deferred(&self, fk: &ForeignKey) -> bool {
        self.deferred && fk.deferrable
    }

    /// First FK violation among rows referencing `targets`
    fn violation(&self, targets: &[TableName], at_commit: bool) -> Option<String> {
        for (name, table) in &self.tables {
            for row in &table.rows {
                for (target, id) in &row.refs {
                    if !targets.contains(target) {
                        continue;
                    }
                    let exists = self.tables[target].rows.iter().any(|r| r.id == *id);
                    if exists {
                        continue;
                    }
                    let deferred = self
                        .foreign_keys
                        .iter()
                        .find(|fk| fk.dependent == *name && fk.referenced == *target)
                        .is_some_and(|fk| self.is_deferred(fk));
                    if deferred && !at_commit {
                        continue;
                    }
                    return Some(format!(
                        "update or delete on table \"{}\" violates foreign key constraint on table \"{}\"",
                        target, name
                    ));
                }
            }
        }
        None
    }

    fn delete(&mut self, table: TableName) -> Result<StatementResult, ConnectionError> {
        let caps = self.backend().capabilities();
        let rows = &self.tables[&table].rows;
        if self.fk_checks
            && !caps.statement_level_fk_checks
            && rows.iter().any(|r| r.refs.iter().any(|(t, _)| *t == table))
        {
            return Err(Self::error(format!(
                "cannot delete parent row of \"{}\": row-by-row foreign key check",
                table
            )));
        }

        let before = self.tables.clone();
        let removed = {
            let t = self.tables.get_mut(&table).map(|t| std::mem::take(&mut t.rows));
            t.map_or(0, |rows| rows.len())
        };
        if self.fk_checks {
            if let Some(msg) = self.violation(&[table], false) {
                self.tables = before;
                return Err(Self::error(msg));
            }
        }
        Ok(StatementResult::affected(removed as u64))
    }

    fn truncate(&mut self, sql: &str) -> Result<StatementResult, ConnectionError> {
        let mut rest = sql
            .strip_prefix("TRUNCATE TABLE ")
            .or_else(|| sql.strip_prefix("TRUNCATE "))
            .unwrap_or_default()
            .to_string();
        let cascade = rest.ends_with(" CASCADE");
        if cascade {
            rest.truncate(rest.len() - " CASCADE".len());
        }
        let restart = rest.ends_with(" RESTART IDENTITY");
        if restart {
            rest.truncate(rest.len() - " RESTART IDENTITY".len());
        }

        let mut targets = rest
            .split(", ")
            .map(|q| self.resolve(q))
            .collect::<Result<Vec<_>, _>>()?;

        match self.kind {
            BackendKind::Postgres => {
                if cascade {
                    let mut i = 0;
                    while i < targets.len() {
                        let current = targets[i].clone();
                        for fk in &self.foreign_keys {
                            if fk.referenced == current && !targets.contains(&fk.dependent) {
                                targets.push(fk.dependent.clone());
                            }
                        }
                        i += 1;
                    }
                } else if let Some(fk) = self
                    .foreign_keys
                    .iter()
                    .find(|fk| targets.contains(&fk.referenced) && !targets.contains(&fk.dependent))
                {
                    return Err(Self::error(format!(
                        "cannot truncate a table referenced in a foreign key constraint: \"{}\" references \"{}\"",
                        fk.dependent, fk.referenced
                    )));
                }
            }
            BackendKind::MySql => {
                if self.fk_checks {
                    if let Some(fk) = self
                        .foreign_keys
                        .iter()
                        .find(|fk| targets.contains(&fk.referenced) && fk.dependent != fk.referenced)
                    {
                        return Err(Self::error(format!(
                            "Cannot truncate a table referenced in a foreign key constraint ({} -> {})",
                            fk.dependent, fk.referenced
                        )));
                    }
                }
            }
            _ => return Err(Self::error("TRUNCATE is not supported")),
        }

        for name in &targets {
            if let Some(table) = self.tables.get_mut(name) {
                table.rows.clear();
                if restart || self.kind == BackendKind::MySql {
                    table.next_id = 1;
                }
            }
        }
        Ok(StatementResult::affected(0))
    }

    fn begin(&mut self) -> Result<StatementResult, ConnectionError> {
        if self.snapshot.is_some() {
            return Err(Self::error("there is already a transaction in progress"));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(StatementResult::default())
    }

    fn commit(&mut self) -> Result<StatementResult, ConnectionError> {
        let Some(snapshot) = self.snapshot.take() else {
            return Err(Self::error("there is no transaction in progress"));
        };
        let all: Vec<TableName> = self.tables.keys().cloned().collect();
        let violation = if self.fk_checks {
            self.violation(&all, true)
        } else {
            None
        };
        self.deferred = false;
        if let Some(msg) = violation {
            self.tables = snapshot;
            return Err(Self::error(msg));
        }
        Ok(StatementResult::default())
    }

    fn rollback(&mut self) -> Result<StatementResult, ConnectionError> {
        let Some(snapshot) = self.snapshot.take() else {
            return Err(Self::error("there is no transaction in progress"));
        };
        self.tables = snapshot;
        self.deferred = false;
        Ok(StatementResult::default())
    }
}

impl Connection for SimDatabase {
    fn execute(&mut self, sql: &str) -> Result<StatementResult, ConnectionError> {
        self.log.push(sql.to_string());
        if let Some(fragment) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(Self::error(format!("injected failure: {}", sql)));
            }
        }

        if let Some(rows) = self.catalog_tables(sql) {
            return Ok(StatementResult::rows(rows));
        }
        if sql == self.backend().list_foreign_keys_sql() {
            return Ok(StatementResult::rows(self.catalog_foreign_keys()));
        }

        match sql {
            "BEGIN TRANSACTION" => return self.begin(),
            "COMMIT" => return self.commit(),
            "ROLLBACK" => return self.rollback(),
            "SET CONSTRAINTS ALL DEFERRED" => {
                if self.kind != BackendKind::Postgres {
                    return Err(Self::error("syntax error at SET CONSTRAINTS"));
                }
                if self.snapshot.is_some() {
                    self.deferred = true;
                }
                return Ok(StatementResult::default());
            }
            _ => {}
        }

        if let Some((disable, enable)) = self.backend().constraint_toggle() {
            if sql == disable {
                self.fk_checks = false;
                return Ok(StatementResult::default());
            }
            if sql == enable {
                self.fk_checks = true;
                return Ok(StatementResult::default());
            }
        }

        if let Some(target) = sql.strip_prefix("DELETE FROM ") {
            let table = self.resolve(target)?;
            return self.delete(table);
        }
        if sql.starts_with("TRUNCATE ") {
            return self.truncate(sql);
        }
        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let target = rest.trim_end_matches(" DEFAULT VALUES");
            let table = self.resolve(target)?;
            let t = self.tables.get_mut(&table).ok_or_else(|| Self::error("no table"))?;
            t.rows.push(Row {
                id: t.next_id,
                refs: Vec::new(),
            });
            t.next_id += 1;
            return Ok(StatementResult::affected(1));
        }

        Err(Self::error(format!("unsupported statement: {}", sql)))
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        self.report_kind.then_some(self.kind)
    }
}

/// Pool handing out handles onto one shared `SimDatabase`.
///
/// Each statement locks the database, so concurrent workers interleave at
/// statement granularity.
pub struct SimPool {
    db: Arc<Mutex<SimDatabase>>,
    acquire_limit: Option<usize>,
    acquired: AtomicUsize,
}

impl SimPool {
    pub fn new(db: SimDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            acquire_limit: None,
            acquired: AtomicUsize::new(0),
        }
    }

    /// Refuse every `acquire` after the first `n`
    pub fn fail_acquire_after(mut self, n: usize) -> Self {
        self.acquire_limit = Some(n);
        self
    }

    pub fn db(&self) -> MutexGuard<'_, SimDatabase> {
        self.db.lock().unwrap()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

impl ConnectionPool for SimPool {
    type Conn = SimHandle;

    fn acquire(&self) -> Result<SimHandle, ConnectionError> {
        let n = self.acquired.fetch_add(1, Ordering::SeqCst);
        if self.acquire_limit.is_some_and(|limit| n >= limit) {
            return Err(ConnectionError::message("pool exhausted"));
        }
        Ok(SimHandle(Arc::clone(&self.db)))
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        self.db().backend_kind()
    }
}

pub struct SimHandle(Arc<Mutex<SimDatabase>>);

impl Connection for SimHandle {
    fn execute(&mut self, sql: &str) -> Result<StatementResult, ConnectionError> {
        self.0.lock().unwrap().execute(sql)
    }

    fn backend_kind(&self) -> Option<BackendKind> {
        self.0.lock().unwrap().backend_kind()
    }
}

/// `customers <- orders <- order_items`, with a few rows in each
pub fn shop(kind: BackendKind) -> SimDatabase {
    let qualify = |t: &str| match kind {
        BackendKind::Postgres => format!("public.{}", t),
        _ => t.to_string(),
    };
    let customers = qualify("customers");
    let orders = qualify("orders");
    let items = qualify("order_items");

    let mut db = SimDatabase::new(kind)
        .table(&customers)
        .table(&orders)
        .table(&items)
        .foreign_key(&orders, &customers)
        .foreign_key(&items, &orders);

    for _ in 0..2 {
        let c = db.insert(&customers, &[]);
        let o = db.insert(&orders, &[(&customers, c)]);
        db.insert(&items, &[(&orders, o)]);
        db.insert(&items, &[(&orders, o)]);
    }
    db
}
