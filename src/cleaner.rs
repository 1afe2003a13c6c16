//! The cleaning pipeline.
//!
//! `Cleaner` validates its configuration, introspects the schema, resolves the
//! table scope, plans a dependency-safe order and runs the chosen strategy.
//! Every call starts from a fresh introspection.

use crate::backend::{Backend, TruncateOptions};
use crate::config::{CleanConfig, Strategy};
use crate::connection::{Connection, ConnectionPool};
use crate::error::CleanError;
use crate::introspect;
use crate::schema::{ClearPlan, DependencyGraph, Schema, Scope, TableName};
use crate::strategy::{
    truncate, Executor, Method, ProgressFn, RunControl, Step, Tally, TransactionScope,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shared flag that stops a running clean before its next statement
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a completed clean
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub strategy: Strategy,
    /// Tables in the order they were cleared
    pub tables_cleared: Vec<TableName>,
    /// Sum of rows-affected counts reported by the backend
    pub rows_deleted: u64,
    pub batches: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl std::fmt::Display for CleanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tables cleared ({}), {} rows removed in {} batches, {:.2}s",
            self.tables_cleared.len(),
            self.strategy,
            self.rows_deleted,
            self.batches,
            self.duration.as_secs_f64()
        )
    }
}

/// Everything decided before the first clearing statement
struct Prepared {
    plan: ClearPlan,
    steps: Vec<Vec<Step>>,
    /// In-scope tables a cascading truncate clears without naming them
    cascaded: Vec<TableName>,
}

pub struct Cleaner {
    config: CleanConfig,
    backend: Option<Box<dyn Backend>>,
    cancel: Option<CancellationToken>,
    progress: Option<Box<ProgressFn>>,
}

impl Cleaner {
    pub fn new(config: CleanConfig) -> Self {
        Self {
            config,
            backend: None,
            cancel: None,
            progress: None,
        }
    }

    /// Use this backend instead of the one the connection reports
    pub fn with_backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Invoke `f` after each table is cleared
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&TableName) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &CleanConfig {
        &self.config
    }

    /// Work out what `clean` would do, without modifying anything
    pub fn plan<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<ClearPlan, CleanError> {
        self.reject_transaction()?;
        let backend = self.backend(conn.backend_kind())?;
        Ok(self.prepare(backend, conn)?.plan)
    }

    /// Clear every in-scope table on one connection
    pub fn clean<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<CleanReport, CleanError> {
        let start = Instant::now();
        self.reject_transaction()?;
        let backend = self.backend(conn.backend_kind())?;
        let prepared = self.prepare(backend, conn)?;

        let mut tally = Tally::default();
        self.executor(backend, start)
            .execute(conn, &prepared.steps, &mut tally)?;
        Ok(self.report(prepared, tally, start))
    }

    /// Clear every in-scope table, running the units of each batch on
    /// separate pooled connections
    pub fn clean_pooled<P: ConnectionPool>(&self, pool: &P) -> Result<CleanReport, CleanError> {
        let start = Instant::now();
        self.reject_transaction()?;
        let mut conn = pool
            .acquire()
            .map_err(|source| CleanError::Introspection { source })?;
        let backend = self.backend(pool.backend_kind().or_else(|| conn.backend_kind()))?;
        let prepared = self.prepare(backend, &mut conn)?;
        drop(conn);

        let mut tally = Tally::default();
        self.executor(backend, start)
            .execute_pooled(pool, &prepared.steps, &mut tally)?;
        Ok(self.report(prepared, tally, start))
    }

    /// Open a transaction that is rolled back on teardown
    pub fn begin_scope<C: Connection>(&self, conn: C) -> Result<TransactionScope<C>, CleanError> {
        self.config.validate()?;
        if self.config.strategy != Strategy::Transaction {
            return Err(CleanError::config(format!(
                "begin_scope requires the transaction strategy, not {}",
                self.config.strategy
            )));
        }
        TransactionScope::begin(conn)
    }

    fn reject_transaction(&self) -> Result<(), CleanError> {
        if self.config.strategy == Strategy::Transaction {
            return Err(CleanError::config(
                "the transaction strategy clears on teardown; use Cleaner::begin_scope",
            ));
        }
        Ok(())
    }

    fn backend(&self, detected: Option<crate::backend::BackendKind>) -> Result<&dyn Backend, CleanError> {
        match (&self.backend, detected) {
            (Some(backend), _) => Ok(backend.as_ref()),
            (None, Some(kind)) => Ok(kind.backend()),
            (None, None) => Err(CleanError::config(
                "connection does not report its database engine; use Cleaner::with_backend",
            )),
        }
    }

    fn executor<'a>(&'a self, backend: &'a dyn Backend, start: Instant) -> Executor<'a> {
        Executor::new(
            backend,
            self.config.strategy,
            TruncateOptions {
                restart_identity: self.config.restart_identity,
                cascade: self.config.cascade,
            },
            RunControl {
                cancel: self.cancel.as_ref(),
                deadline: self.config.timeout.map(|t| start + t),
                progress: self.progress.as_deref(),
            },
        )
    }

    fn prepare<C: Connection + ?Sized>(
        &self,
        backend: &dyn Backend,
        conn: &mut C,
    ) -> Result<Prepared, CleanError> {
        self.config.validate()?;
        if self.config.strategy == Strategy::Truncate {
            truncate::check_support(backend, &self.config)?;
        }

        let schema = introspect::introspect(
            backend,
            conn,
            self.config.schema.as_deref(),
            &self.config.protected_tables,
        )?;
        let scope = resolve_scope(&schema, &self.config)?;
        let graph = DependencyGraph::new(schema);

        let outside = graph.outside_dependents(&scope);
        if !outside.is_empty() {
            warn!(
                tables = ?outside.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                "tables outside the clean scope reference tables being cleared"
            );
        }

        let ordered = graph.clear_plan(&scope);
        let (plan, cascaded) = if self.config.cascade {
            let plan = truncate::cascade_plan(&graph, &scope)?;
            let roots: Vec<&TableName> = plan.tables().collect();
            let cascaded = ordered
                .tables()
                .filter(|t| !roots.contains(t))
                .cloned()
                .collect();
            (plan, cascaded)
        } else {
            (ordered, Vec::new())
        };

        let steps = self.executor(backend, Instant::now()).prepare(&plan)?;
        check_toggled_scope(&graph, &scope, &steps)?;
        Ok(Prepared {
            plan,
            steps,
            cascaded,
        })
    }

    fn report(&self, prepared: Prepared, mut tally: Tally, start: Instant) -> CleanReport {
        tally.cleared.extend(prepared.cascaded);
        let report = CleanReport {
            strategy: self.config.strategy,
            tables_cleared: tally.cleared,
            rows_deleted: tally.rows_deleted,
            batches: prepared.steps.len(),
            duration: start.elapsed(),
        };
        info!(
            strategy = %report.strategy,
            tables = report.tables_cleared.len(),
            rows = report.rows_deleted,
            batches = report.batches,
            "clean complete"
        );
        report
    }
}

/// Units cleared with FK checks switched off must have no dependents outside
/// the scope: nothing would stop the clear from leaving their rows dangling.
fn check_toggled_scope(
    graph: &DependencyGraph,
    scope: &Scope,
    steps: &[Vec<Step>],
) -> Result<(), CleanError> {
    let toggled = steps
        .iter()
        .flatten()
        .filter(|step| step.method == Method::Toggle)
        .flat_map(Step::tables)
        .filter_map(|t| graph.schema().get_table_id(t));
    let exposed = graph.dependents_outside(toggled, scope);
    if exposed.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = exposed.iter().map(|t| t.to_string()).collect();
    Err(CleanError::config(format!(
        "clearing would disable foreign key checks while {} still reference cleared tables; \
         add them to the scope or clear them first",
        names.join(", ")
    )))
}

/// Turn `only_tables` / `skip_tables` into the set of tables to clear.
///
/// `only_tables` entries must each name an existing, unprotected table.
/// `skip_tables` entries that match nothing are only logged.
fn resolve_scope(schema: &Schema, config: &CleanConfig) -> Result<Scope, CleanError> {
    if !config.only_tables.is_empty() {
        let mut scope = Scope::none(schema.len());
        for pattern in &config.only_tables {
            let ids = schema.find(pattern);
            if ids.is_empty() {
                if schema.protected().iter().any(|t| t.matches(pattern)) {
                    return Err(CleanError::config(format!(
                        "only_tables names protected table {}",
                        pattern
                    )));
                }
                return Err(CleanError::config(format!(
                    "only_tables names unknown table {}",
                    pattern
                )));
            }
            for id in ids {
                scope.insert(id);
            }
        }
        return Ok(scope);
    }

    let mut scope = Scope::all(schema.len());
    for pattern in &config.skip_tables {
        let ids = schema.find(pattern);
        if ids.is_empty() {
            warn!(table = %pattern, "skip_tables entry matches no table");
        }
        for id in ids {
            scope.remove(id);
        }
    }
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::schema::SchemaBuilder;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new()
            .table("public.customers")
            .table("public.orders")
            .table("audit.orders");
        builder.add_protected(TableName::parse("public.schema_migrations"));
        builder.build()
    }

    #[test]
    fn test_scope_defaults_to_all() {
        let scope = resolve_scope(&schema(), &CleanConfig::default()).unwrap();
        assert_eq!(scope.len(), 3);
    }

    #[test]
    fn test_bare_only_entry_matches_every_schema() {
        let config = CleanConfig {
            only_tables: vec!["orders".into()],
            ..CleanConfig::default()
        };
        assert_eq!(resolve_scope(&schema(), &config).unwrap().len(), 2);
    }

    #[test]
    fn test_only_protected_table_is_configuration_error() {
        let config = CleanConfig {
            only_tables: vec!["schema_migrations".into()],
            ..CleanConfig::default()
        };
        let err = resolve_scope(&schema(), &config).unwrap_err();
        assert_eq!(err.stage(), Stage::Configuration);
        assert!(err.to_string().contains("protected"));
    }

    #[test]
    fn test_only_unknown_table_is_configuration_error() {
        let config = CleanConfig {
            only_tables: vec!["nope".into()],
            ..CleanConfig::default()
        };
        assert!(resolve_scope(&schema(), &config)
            .unwrap_err()
            .to_string()
            .contains("unknown"));
    }

    #[test]
    fn test_skip_qualified_entry() {
        let config = CleanConfig {
            skip_tables: vec!["audit.orders".into(), "missing".into()],
            ..CleanConfig::default()
        };
        let schema = schema();
        let scope = resolve_scope(&schema, &config).unwrap();
        let audit = schema.get_table_id(&TableName::parse("audit.orders")).unwrap();
        assert!(!scope.contains(audit));
        assert_eq!(scope.len(), 2);
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_report_display() {
        let report = CleanReport {
            strategy: Strategy::Delete,
            tables_cleared: vec![TableName::new("a"), TableName::new("b")],
            rows_deleted: 7,
            batches: 1,
            duration: Duration::from_millis(250),
        };
        assert_eq!(
            report.to_string(),
            "2 tables cleared (delete), 7 rows removed in 1 batches, 0.25s"
        );
    }
}
