use super::{quote_literal, Backend, BackendKind, Capabilities, TruncateOptions};
use crate::schema::TableName;

/// PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Backend for Postgres {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            statement_level_fk_checks: true,
            deferrable_constraints: true,
            multi_table_truncate: true,
            truncate_cascade: true,
            restart_identity: true,
            truncate_requires_toggle: false,
        }
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> String {
        let mut sql = String::from(
            "SELECT n.nspname, c.relname \
             FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relkind IN ('r', 'p') \
             AND NOT c.relispartition \
             AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
             AND n.nspname NOT LIKE 'pg\\_toast%' \
             AND n.nspname NOT LIKE 'pg\\_temp\\_%'",
        );
        if let Some(schema) = schema {
            sql.push_str(&format!(" AND n.nspname = {}", quote_literal(schema)));
        }
        sql.push_str(" ORDER BY n.nspname, c.relname");
        sql
    }

    fn list_foreign_keys_sql(&self) -> String {
        "SELECT dn.nspname, dc.relname, rn.nspname, rc.relname, \
         con.confdeltype::text, con.condeferrable::text \
         FROM pg_catalog.pg_constraint con \
         JOIN pg_catalog.pg_class dc ON dc.oid = con.conrelid \
         JOIN pg_catalog.pg_namespace dn ON dn.oid = dc.relnamespace \
         JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid \
         JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace \
         WHERE con.contype = 'f' \
         ORDER BY 1, 2, 3, 4"
            .to_string()
    }

    fn truncate_sql(&self, tables: &[TableName], options: TruncateOptions) -> Vec<String> {
        if tables.is_empty() {
            return Vec::new();
        }
        let names: Vec<String> = tables.iter().map(|t| self.qualified_name(t)).collect();
        let mut sql = format!("TRUNCATE TABLE {}", names.join(", "));
        if options.restart_identity {
            sql.push_str(" RESTART IDENTITY");
        }
        if options.cascade {
            sql.push_str(" CASCADE");
        }
        vec![sql]
    }

    fn defer_constraints_sql(&self) -> Option<&'static str> {
        Some("SET CONSTRAINTS ALL DEFERRED")
    }
}
