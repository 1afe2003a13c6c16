//! Schema introspection.
//!
//! Two read-only catalog queries per call, no caching: the schema may change
//! between test suites.

use crate::backend::Backend;
use crate::connection::{Connection, ConnectionError, Row};
use crate::error::CleanError;
use crate::schema::{ForeignKeyRef, Schema, SchemaBuilder, TableName};
use tracing::debug;

/// Migration and metadata tables of common frameworks. Never cleared.
pub const BUILTIN_PROTECTED_TABLES: &[&str] = &[
    "schema_migrations",
    "_sqlx_migrations",
    "__diesel_schema_migrations",
    "ar_internal_metadata",
    "flyway_schema_history",
    "knex_migrations",
    "knex_migrations_lock",
    "seaql_migrations",
    "refinery_schema_history",
    "goose_db_version",
];

/// Check a table against the built-in and caller-supplied protected lists
pub fn is_protected(table: &TableName, extra: &[String]) -> bool {
    BUILTIN_PROTECTED_TABLES
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .any(|pattern| table.matches(pattern))
}

/// Enumerate user tables and the FK edges between them.
///
/// System and protected tables end up in [`Schema::protected`] instead of the
/// table arena.
pub fn introspect<C: Connection + ?Sized>(
    backend: &dyn Backend,
    conn: &mut C,
    schema_filter: Option<&str>,
    protected: &[String],
) -> Result<Schema, CleanError> {
    let mut builder = SchemaBuilder::new();

    let table_rows = query(conn, &backend.list_tables_sql(schema_filter))?;
    for row in &table_rows {
        let table = parse_table(row)?;
        if backend.is_system_table(&table) || is_protected(&table, protected) {
            debug!(table = %table, "skipping protected table");
            builder.add_protected(table);
        } else {
            builder.add_table(table);
        }
    }

    let fk_rows = query(conn, &backend.list_foreign_keys_sql())?;
    for row in &fk_rows {
        builder.add_foreign_key(parse_foreign_key(row)?);
    }

    let schema = builder.build();
    debug!(
        tables = schema.len(),
        foreign_keys = schema.edges().len(),
        unresolved = schema.unresolved_foreign_keys().len(),
        protected = schema.protected().len(),
        "introspected schema"
    );
    Ok(schema)
}

fn query<C: Connection + ?Sized>(conn: &mut C, sql: &str) -> Result<Vec<Row>, CleanError> {
    debug!(sql, "catalog query");
    conn.execute(sql)
        .map(|result| result.rows)
        .map_err(|source| CleanError::Introspection { source })
}

fn malformed(what: &str, row: &Row) -> CleanError {
    CleanError::Introspection {
        source: ConnectionError::message(format!("malformed {} row: {:?}", what, row)),
    }
}

fn parse_table(row: &Row) -> Result<TableName, CleanError> {
    match row.as_slice() {
        [schema, Some(name), ..] if !name.is_empty() => Ok(table_name(schema, name)),
        _ => Err(malformed("table", row)),
    }
}

fn parse_foreign_key(row: &Row) -> Result<ForeignKeyRef, CleanError> {
    let [dep_schema, Some(dep_table), ref_schema, Some(ref_table), rest @ ..] = row.as_slice()
    else {
        return Err(malformed("foreign key", row));
    };
    let delete_rule = rest.first().cloned().flatten();
    let deferrable = rest.get(1).cloned().flatten();

    Ok(ForeignKeyRef {
        dependent: table_name(dep_schema, dep_table),
        referenced: table_name(ref_schema, ref_table),
        cascade_delete: delete_rule.as_deref().is_some_and(is_cascade_rule),
        deferrable: deferrable.as_deref().is_some_and(parse_flag),
    })
}

fn table_name(schema: &Option<String>, name: &str) -> TableName {
    match schema.as_deref() {
        Some(schema) if !schema.is_empty() => TableName::qualified(schema, name),
        _ => TableName::new(name),
    }
}

/// `c` is pg_constraint.confdeltype; the rest spell the rule out
fn is_cascade_rule(rule: &str) -> bool {
    rule == "c" || rule.eq_ignore_ascii_case("cascade")
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "t" | "true" | "1" | "yes" | "y"
    )
}
