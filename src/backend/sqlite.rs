use super::{Backend, BackendKind, Capabilities, TruncateOptions};
use crate::schema::TableName;

/// SQLite (no schemas; `TRUNCATE` is emulated with `DELETE`)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Backend for Sqlite {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            statement_level_fk_checks: true,
            deferrable_constraints: false,
            multi_table_truncate: false,
            truncate_cascade: false,
            restart_identity: false,
            truncate_requires_toggle: false,
        }
    }

    fn list_tables_sql(&self, _schema: Option<&str>) -> String {
        "SELECT NULL, name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name"
            .to_string()
    }

    fn list_foreign_keys_sql(&self) -> String {
        "SELECT NULL, m.name, NULL, p.\"table\", p.on_delete, 'NO' \
         FROM sqlite_master m \
         JOIN pragma_foreign_key_list(m.name) p \
         WHERE m.type = 'table' \
         ORDER BY 2, 4"
            .to_string()
    }

    fn is_system_table(&self, table: &TableName) -> bool {
        table.name.to_lowercase().starts_with("sqlite_")
    }

    fn truncate_sql(&self, tables: &[TableName], _options: TruncateOptions) -> Vec<String> {
        tables.iter().map(|t| self.delete_sql(t)).collect()
    }

    fn constraint_toggle(&self) -> Option<(&'static str, &'static str)> {
        Some(("PRAGMA foreign_keys = OFF", "PRAGMA foreign_keys = ON"))
    }
}
