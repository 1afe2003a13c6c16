use super::{quote_literal, Backend, BackendKind, Capabilities, TruncateOptions};
use crate::schema::TableName;

/// MySQL / MariaDB (schema = database)
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Backend for MySql {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn capabilities(&self) -> Capabilities {
        // InnoDB checks FKs row by row and has no deferred constraints.
        // TRUNCATE always resets AUTO_INCREMENT.
        Capabilities {
            statement_level_fk_checks: false,
            deferrable_constraints: false,
            multi_table_truncate: false,
            truncate_cascade: false,
            restart_identity: true,
            truncate_requires_toggle: true,
        }
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> String {
        let filter = match schema {
            Some(schema) => quote_literal(schema),
            None => "DATABASE()".to_string(),
        };
        format!(
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_schema = {} \
             ORDER BY table_schema, table_name",
            filter
        )
    }

    fn list_foreign_keys_sql(&self) -> String {
        "SELECT constraint_schema, table_name, unique_constraint_schema, referenced_table_name, \
         delete_rule, 'NO' \
         FROM information_schema.referential_constraints \
         WHERE constraint_schema NOT IN ('mysql', 'sys', 'performance_schema', 'information_schema') \
         ORDER BY 1, 2, 3, 4"
            .to_string()
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn truncate_sql(&self, tables: &[TableName], _options: TruncateOptions) -> Vec<String> {
        tables
            .iter()
            .map(|t| format!("TRUNCATE TABLE {}", self.qualified_name(t)))
            .collect()
    }

    fn constraint_toggle(&self) -> Option<(&'static str, &'static str)> {
        Some(("SET FOREIGN_KEY_CHECKS = 0", "SET FOREIGN_KEY_CHECKS = 1"))
    }
}
