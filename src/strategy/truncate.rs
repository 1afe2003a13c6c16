//! Truncate strategy.
//!
//! Follows the delete order unless `cascade` is set, in which case the plan
//! collapses to the in-scope root tables and one `TRUNCATE ... CASCADE`
//! clears everything that depends on them.

use super::Statement;
use crate::backend::{Backend, TruncateOptions};
use crate::config::CleanConfig;
use crate::error::CleanError;
use crate::schema::{ClearBatch, ClearPlan, ClearUnit, DependencyGraph, Scope, TableName};

/// Reject truncate options the backend cannot honour
pub(crate) fn check_support(backend: &dyn Backend, config: &CleanConfig) -> Result<(), CleanError> {
    let caps = backend.capabilities();
    if config.restart_identity && !caps.restart_identity {
        return Err(CleanError::config(format!(
            "restart_identity is not supported on {}",
            backend.kind()
        )));
    }
    if config.cascade && !caps.truncate_cascade {
        return Err(CleanError::config(format!(
            "cascading truncate is not supported on {}",
            backend.kind()
        )));
    }
    Ok(())
}

pub(crate) fn statements(
    backend: &dyn Backend,
    unit: &ClearUnit,
    options: TruncateOptions,
) -> Vec<Statement> {
    let sql = backend.truncate_sql(&unit.tables, options);
    if sql.len() == unit.tables.len() {
        unit.tables
            .iter()
            .cloned()
            .zip(sql)
            .map(|(table, sql)| Statement {
                tables: vec![table],
                sql,
            })
            .collect()
    } else {
        // One statement clearing the whole unit
        sql.into_iter()
            .map(|sql| Statement {
                tables: unit.tables.clone(),
                sql,
            })
            .collect()
    }
}

/// Single-unit plan truncating the in-scope roots with `CASCADE`.
///
/// Fails if the cascade would reach any table outside `scope`: a skipped or
/// protected table is never cleared as a side effect.
pub(crate) fn cascade_plan(graph: &DependencyGraph, scope: &Scope) -> Result<ClearPlan, CleanError> {
    let roots = graph.cascade_roots(scope);
    if roots.is_empty() {
        return Ok(ClearPlan::default());
    }

    let escapes = graph.cascade_escapes(&roots, scope);
    if !escapes.is_empty() {
        return Err(CleanError::config(format!(
            "cascading truncate would also clear tables outside the requested scope: {}",
            escapes
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let tables: Vec<TableName> = roots
        .iter()
        .filter_map(|&id| graph.table_name(id).cloned())
        .collect();
    Ok(ClearPlan {
        batches: vec![ClearBatch {
            units: vec![ClearUnit {
                tables,
                cyclic: false,
                deferrable: false,
            }],
        }],
    })
}
