use super::{quote_literal, Backend, BackendKind, Capabilities, TruncateOptions};
use crate::schema::TableName;

/// DuckDB (embedded; `TRUNCATE` behaves like `DELETE`)
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDb;

impl Backend for DuckDb {
    fn kind(&self) -> BackendKind {
        BackendKind::DuckDb
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

    fn list_tables_sql(&self, schema: Option<&str>) -> String {
        let mut sql = String::from(
            "SELECT schema_name, table_name FROM duckdb_tables() \
             WHERE NOT internal AND NOT temporary \
             AND database_name = current_database()",
        );
        if let Some(schema) = schema {
            sql.push_str(&format!(" AND schema_name = {}", quote_literal(schema)));
        }
        sql.push_str(" ORDER BY schema_name, table_name");
        sql
    }

    /// The referenced table is read from the constraint text, which every
    /// DuckDB release reports as `FOREIGN KEY (...) REFERENCES [schema.]table(...)`
    /// with the name spelled as the DDL wrote it, quotes included. Identifiers
    /// are case-insensitive, so the name is matched against `duckdb_tables()`
    /// and the catalog spelling is returned; an unqualified reference lives in
    /// the referencing table's schema. A target the catalog does not know is
    /// still returned as written, so the schema builder can report it.
    ///
    /// Self-references are dropped: DuckDB checks keys per statement, so they
    /// never affect ordering.
    fn list_foreign_keys_sql(&self) -> String {
        r#"WITH refs AS (
    SELECT schema_name, table_name,
           trim(regexp_extract(constraint_text, 'REFERENCES\s+(?:("[^"]+"|[^\s."(]+)\.)?("[^"]+"|[^\s"(]+)', 1), '"') AS ref_schema,
           trim(regexp_extract(constraint_text, 'REFERENCES\s+(?:("[^"]+"|[^\s."(]+)\.)?("[^"]+"|[^\s"(]+)', 2), '"') AS ref_table
    FROM duckdb_constraints()
    WHERE constraint_type = 'FOREIGN KEY'
      AND database_name = current_database()
),
fks AS (
    SELECT schema_name, table_name, ref_table,
           CASE WHEN ref_schema = '' THEN schema_name ELSE ref_schema END AS ref_schema
    FROM refs
)
SELECT f.schema_name, f.table_name,
       coalesce(t.schema_name, f.ref_schema),
       coalesce(t.table_name, f.ref_table),
       'NO ACTION', 'NO'
FROM fks f
LEFT JOIN duckdb_tables() t
  ON t.database_name = current_database()
 AND NOT t.internal
 AND lower(t.table_name) = lower(f.ref_table)
 AND lower(t.schema_name) = lower(f.ref_schema)
WHERE t.table_name IS NULL
   OR lower(t.schema_name) <> lower(f.schema_name)
   OR lower(t.table_name) <> lower(f.table_name)
ORDER BY 1, 2, 3, 4"#
            .to_string()
    }

    fn truncate_sql(&self, tables: &[TableName], _options: TruncateOptions) -> Vec<String> {
        tables
            .iter()
            .map(|t| format!("TRUNCATE {}", self.qualified_name(t)))
            .collect()
    }
}
