//! Delete strategy: one `DELETE FROM` per table.

use super::Statement;
use crate::backend::Backend;
use crate::schema::ClearUnit;

pub(crate) fn statements(backend: &dyn Backend, unit: &ClearUnit) -> Vec<Statement> {
    unit.tables
        .iter()
        .map(|table| Statement {
            tables: vec![table.clone()],
            sql: backend.delete_sql(table),
        })
        .collect()
}
