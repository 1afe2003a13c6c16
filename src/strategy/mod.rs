//! Strategy execution: turns a [`ClearPlan`] into statements and runs them.
//!
//! Cyclic units are cleared with the first cycle-safe method the backend
//! offers:
//! 1. a single statement, when FK checks run at end of statement
//! 2. deferred constraints inside a transaction
//! 3. a session toggle that disables FK checks
//!
//! Every unit is resolved before the first statement runs, so an
//! unresolvable cycle fails without touching the database.

mod delete;
mod transaction;
pub(crate) mod truncate;

pub use transaction::TransactionScope;

use crate::backend::{Backend, TruncateOptions};
use crate::cleaner::CancellationToken;
use crate::config::Strategy;
use crate::connection::{Connection, ConnectionError, ConnectionPool};
use crate::error::CleanError;
use crate::schema::{ClearPlan, ClearUnit, TableName};
use std::thread;
use std::time::Instant;
use tracing::{debug, error};

/// Callback invoked after each table is cleared
pub type ProgressFn = dyn Fn(&TableName) + Send + Sync;

/// How a unit is cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    /// Statements run as-is
    Plain,
    /// Inside a transaction with constraints deferred to commit
    Deferred,
    /// Between the backend's disable/enable FK check statements
    Toggle,
}

/// One statement clearing one or more tables
#[derive(Debug, Clone)]
pub(crate) struct Statement {
    pub tables: Vec<TableName>,
    pub sql: String,
}

impl Statement {
    fn first_table(&self) -> TableName {
        self.tables.first().cloned().unwrap_or_else(|| TableName::new(""))
    }
}

/// A resolved unit, ready to run
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub method: Method,
    pub statements: Vec<Statement>,
}

impl Step {
    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.statements.iter().flat_map(|s| s.tables.iter())
    }
}

/// Cancellation, deadline and progress reporting for one run
#[derive(Clone, Copy, Default)]
pub(crate) struct RunControl<'a> {
    pub cancel: Option<&'a CancellationToken>,
    pub deadline: Option<Instant>,
    pub progress: Option<&'a ProgressFn>,
}

impl RunControl<'_> {
    fn should_stop(&self) -> bool {
        self.cancel.is_some_and(|c| c.is_cancelled())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Tables cleared and rows removed so far
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub cleared: Vec<TableName>,
    pub rows_deleted: u64,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.cleared.extend(other.cleared);
        self.rows_deleted += other.rows_deleted;
    }
}

pub(crate) struct Executor<'a> {
    backend: &'a dyn Backend,
    strategy: Strategy,
    options: TruncateOptions,
    control: RunControl<'a>,
}

impl<'a> Executor<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        strategy: Strategy,
        options: TruncateOptions,
        control: RunControl<'a>,
    ) -> Self {
        Self {
            backend,
            strategy,
            options,
            control,
        }
    }

    /// Resolve a clearing method and statements for every unit of the plan.
    ///
    /// Fails with `UnresolvableDependency` for the first cyclic unit the
    /// backend cannot clear safely.
    pub fn prepare(&self, plan: &ClearPlan) -> Result<Vec<Vec<Step>>, CleanError> {
        // A referenced table can only be truncated together with its
        // dependents, so the whole plan becomes one statement.
        if self.strategy == Strategy::Truncate
            && self.backend.capabilities().multi_table_truncate
            && !plan.is_empty()
        {
            let unit = ClearUnit {
                tables: plan.tables().cloned().collect(),
                cyclic: false,
                deferrable: false,
            };
            return Ok(vec![vec![self.prepare_unit(&unit)?]]);
        }

        plan.batches
            .iter()
            .map(|batch| {
                batch
                    .units
                    .iter()
                    .map(|unit| self.prepare_unit(unit))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    fn prepare_unit(&self, unit: &ClearUnit) -> Result<Step, CleanError> {
        let method = self
            .resolve(unit)
            .ok_or_else(|| CleanError::UnresolvableDependency {
                tables: unit.tables.clone(),
                strategy: self.strategy,
            })?;
        let statements = match self.strategy {
            Strategy::Truncate => truncate::statements(self.backend, unit, self.options),
            _ => delete::statements(self.backend, unit),
        };
        if unit.cyclic {
            debug!(tables = ?unit.tables, ?method, "resolved cyclic unit");
        }
        Ok(Step { method, statements })
    }

    fn resolve(&self, unit: &ClearUnit) -> Option<Method> {
        let caps = self.backend.capabilities();
        let toggle = self.backend.constraint_toggle().map(|_| Method::Toggle);

        if self.strategy == Strategy::Truncate && caps.truncate_requires_toggle {
            return toggle;
        }
        if !unit.cyclic
            || (unit.is_self_reference() && caps.statement_level_fk_checks)
            || (self.strategy == Strategy::Truncate && caps.multi_table_truncate)
        {
            return Some(Method::Plain);
        }
        if unit.deferrable
            && caps.deferrable_constraints
            && self.backend.defer_constraints_sql().is_some()
        {
            return Some(Method::Deferred);
        }
        toggle
    }

    /// Run all steps on one connection, batch after batch
    pub fn execute<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        steps: &[Vec<Step>],
        tally: &mut Tally,
    ) -> Result<(), CleanError> {
        for (i, batch) in steps.iter().enumerate() {
            debug!(batch = i, units = batch.len(), "clearing batch");
            for step in batch {
                self.run_step(conn, step, tally)?;
            }
        }
        Ok(())
    }

    /// Run the units of each batch concurrently, one pooled connection per
    /// worker. Every worker of a batch is joined before the next batch starts.
    pub fn execute_pooled<P: ConnectionPool>(
        &self,
        pool: &P,
        steps: &[Vec<Step>],
        tally: &mut Tally,
    ) -> Result<(), CleanError> {
        for (i, batch) in steps.iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            let workers = worker_count(batch.len());
            let share = batch.len().div_ceil(workers);
            debug!(batch = i, units = batch.len(), workers, "clearing batch");

            let outcomes: Vec<(Tally, Result<(), CleanError>)> = thread::scope(|s| {
                let handles: Vec<_> = batch
                    .chunks(share)
                    .map(|steps| s.spawn(move || self.run_worker(pool, steps)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                    .collect()
            });

            let mut failure = None;
            for (local, result) in outcomes {
                tally.merge(local);
                if let Err(e) = result {
                    failure.get_or_insert(e);
                }
            }
            match failure {
                Some(CleanError::Cancelled { .. }) => {
                    return Err(CleanError::Cancelled {
                        cleared: tally.cleared.clone(),
                    })
                }
                Some(e) => return Err(e),
                None => {}
            }
        }
        Ok(())
    }

    fn run_worker<P: ConnectionPool>(&self, pool: &P, steps: &[Step]) -> (Tally, Result<(), CleanError>) {
        let mut local = Tally::default();
        let result = match pool.acquire() {
            Ok(mut conn) => steps
                .iter()
                .try_for_each(|step| self.run_step(&mut conn, step, &mut local)),
            Err(source) => Err(CleanError::ClearExecution {
                table: steps
                    .first()
                    .and_then(|s| s.statements.first())
                    .map(Statement::first_table)
                    .unwrap_or_else(|| TableName::new("")),
                source,
            }),
        };
        (local, result)
    }

    fn run_step<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        step: &Step,
        tally: &mut Tally,
    ) -> Result<(), CleanError> {
        match step.method {
            Method::Plain => self.run_statements(conn, &step.statements, tally),
            Method::Deferred => self.run_deferred(conn, step, tally),
            Method::Toggle => self.run_toggled(conn, step, tally),
        }
    }

    fn checkpoint(&self, tally: &Tally) -> Result<(), CleanError> {
        if self.control.should_stop() {
            return Err(CleanError::Cancelled {
                cleared: tally.cleared.clone(),
            });
        }
        Ok(())
    }

    fn exec<C: Connection + ?Sized>(&self, conn: &mut C, stmt: &Statement) -> Result<u64, CleanError> {
        debug!(sql = %stmt.sql, "clearing");
        conn.execute(&stmt.sql)
            .map(|r| r.rows_affected)
            .map_err(|source| CleanError::ClearExecution {
                table: stmt.first_table(),
                source,
            })
    }

    fn record(&self, tables: &[TableName], rows: u64, tally: &mut Tally) {
        tally.rows_deleted += rows;
        for table in tables {
            debug!(table = %table, "table cleared");
            if let Some(progress) = self.control.progress {
                progress(table);
            }
            tally.cleared.push(table.clone());
        }
    }

    fn run_statements<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        statements: &[Statement],
        tally: &mut Tally,
    ) -> Result<(), CleanError> {
        for stmt in statements {
            self.checkpoint(tally)?;
            let rows = self.exec(conn, stmt)?;
            self.record(&stmt.tables, rows, tally);
        }
        Ok(())
    }

    /// Nothing counts as cleared until the commit succeeds
    fn run_deferred<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        step: &Step,
        tally: &mut Tally,
    ) -> Result<(), CleanError> {
        let Some(defer) = self.backend.defer_constraints_sql() else {
            return Err(self.unresolvable(step));
        };
        self.checkpoint(tally)?;
        conn.begin_transaction()
            .map_err(|source| CleanError::Transaction {
                action: "begin",
                source,
            })?;

        match self.deferred_body(conn, defer, step, tally) {
            Ok(rows) => {
                conn.commit().map_err(|source| CleanError::Transaction {
                    action: "commit",
                    source,
                })?;
                let tables: Vec<TableName> = step.tables().cloned().collect();
                self.record(&tables, rows, tally);
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback() {
                    error!(error = %rollback, "rollback after failed deferred clear failed");
                }
                Err(e)
            }
        }
    }

    fn deferred_body<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        defer: &str,
        step: &Step,
        tally: &Tally,
    ) -> Result<u64, CleanError> {
        let first = step.statements.first();
        conn.execute(defer).map_err(|source| CleanError::ClearExecution {
            table: first.map(Statement::first_table).unwrap_or_else(|| TableName::new("")),
            source,
        })?;
        let mut rows = 0;
        for stmt in &step.statements {
            self.checkpoint(tally)?;
            rows += self.exec(conn, stmt)?;
        }
        Ok(rows)
    }

    /// FK checks are re-enabled even when a statement fails
    fn run_toggled<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        step: &Step,
        tally: &mut Tally,
    ) -> Result<(), CleanError> {
        let Some((disable, enable)) = self.backend.constraint_toggle() else {
            return Err(self.unresolvable(step));
        };
        let table = step
            .statements
            .first()
            .map(Statement::first_table)
            .unwrap_or_else(|| TableName::new(""));
        self.checkpoint(tally)?;
        conn.execute(disable)
            .map_err(|source| toggle_error(&table, source))?;

        let result = self.run_statements(conn, &step.statements, tally);

        if let Err(source) = conn.execute(enable) {
            error!(error = %source, sql = enable, "failed to re-enable foreign key checks");
            result?;
            return Err(toggle_error(&table, source));
        }
        result
    }

    fn unresolvable(&self, step: &Step) -> CleanError {
        CleanError::UnresolvableDependency {
            tables: step.tables().cloned().collect(),
            strategy: self.strategy,
        }
    }
}

fn toggle_error(table: &TableName, source: ConnectionError) -> CleanError {
    CleanError::ClearExecution {
        table: table.clone(),
        source,
    }
}

fn worker_count(units: usize) -> usize {
    let cores = thread::available_parallelism().map_or(1, |n| n.get());
    units.clamp(1, cores)
}
