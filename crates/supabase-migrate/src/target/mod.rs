//! Target (Supabase) database access.

mod postgres;

pub use postgres::PgTargetPool;

use crate::catalog::{
    qualify_table, quote_ident, BindingValue, Column, SequenceDescriptor, TableDescriptor,
    ID_COLUMN,
};
use crate::error::{MigrateError, Result};
use crate::source::Row;
use async_trait::async_trait;

/// Write access to the Supabase database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Column list of a table, empty if the table does not exist.
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;

    /// Upsert rows by primary key, overwriting every non-key column.
    ///
    /// Rows are written one statement at a time; each commits on its own.
    async fn upsert_rows(&self, schema: &str, table: &TableDescriptor, rows: &[Row])
        -> Result<u64>;

    /// Set `seq` to the table's maximum `id` (1 for an empty table).
    /// Returns the value the sequence was set to.
    async fn reset_sequence(&self, schema: &str, seq: &SequenceDescriptor) -> Result<i64>;

    /// Exact row count of a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;
}

/// Build the upsert statement for a table.
///
/// On `id` conflict every other column takes the incoming value.
pub fn build_upsert_sql(schema: &str, table: &TableDescriptor) -> String {
    let col_list: Vec<String> = table
        .bindings
        .iter()
        .map(|b| quote_ident(&b.name))
        .collect();

    let mut idx = 0;
    let values: Vec<String> = table
        .bindings
        .iter()
        .map(|b| match &b.value {
            BindingValue::Param { cast } => {
                idx += 1;
                format!("${}{}", idx, cast)
            }
            BindingValue::Now => "now()".to_string(),
        })
        .collect();

    let update_cols: Vec<String> = table
        .bindings
        .iter()
        .filter(|b| b.name != ID_COLUMN)
        .map(|b| format!("{} = EXCLUDED.{}", quote_ident(&b.name), quote_ident(&b.name)))
        .collect();

    let conflict = if update_cols.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", update_cols.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        qualify_table(schema, &table.name),
        col_list.join(", "),
        values.join(", "),
        quote_ident(ID_COLUMN),
        conflict
    )
}

/// Number of positional parameters in the upsert statement.
pub fn param_count(table: &TableDescriptor) -> usize {
    table
        .bindings
        .iter()
        .filter(|b| matches!(b.value, BindingValue::Param { .. }))
        .count()
}

/// Text parameters for one row, in binding order.
pub fn row_params<'a>(table: &TableDescriptor, row: &'a Row) -> Result<Vec<Option<&'a str>>> {
    let mut params = Vec::with_capacity(table.bindings.len());
    for binding in &table.bindings {
        if let BindingValue::Param { .. } = binding.value {
            if !row.has_column(&binding.name) {
                return Err(MigrateError::transfer(
                    &table.name,
                    format!("row is missing column `{}`", binding.name),
                ));
            }
            params.push(row.get(&binding.name));
        }
    }
    Ok(params)
}

/// Build the sequence reset statement.
pub fn build_setval_sql(schema: &str, seq: &SequenceDescriptor) -> String {
    let regclass = format!("{}.{}", quote_ident(schema), quote_ident(&seq.sequence));
    let id = quote_ident(ID_COLUMN);
    format!(
        "SELECT setval('{}'::regclass, COALESCE(MAX({id}), 1), MAX({id}) IS NOT NULL) FROM {}",
        regclass.replace('\'', "''"),
        qualify_table(schema, &seq.table),
        id = id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnManifest, USERS_COLUMNS, USERS_TABLE, UPDATED_AT_COLUMN};
    use std::sync::Arc;

    fn monitors() -> TableDescriptor {
        let cols = vec![
            Column::builtin("id", "int8"),
            Column::builtin("name", "text"),
            Column::builtin("active", "bool"),
        ];
        TableDescriptor::resolve("monitors", &cols, &cols, &ColumnManifest::default()).unwrap()
    }

    #[test]
    fn test_upsert_overwrites_every_non_key_column() {
        let sql = build_upsert_sql("public", &monitors());
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"monitors\" (\"id\", \"name\", \"active\") \
             VALUES ($1::\"int8\", $2::\"text\", $3::\"bool\") \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\", \
             \"active\" = EXCLUDED.\"active\""
        );
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_key_only_table_does_nothing_on_conflict() {
        let cols = vec![Column::builtin("id", "int8")];
        let desc =
            TableDescriptor::resolve("services", &cols, &cols, &ColumnManifest::default()).unwrap();
        assert!(build_upsert_sql("public", &desc).ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_users_upsert_stamps_updated_at() {
        let source: Vec<Column> = USERS_COLUMNS
            .iter()
            .filter(|c| **c != UPDATED_AT_COLUMN)
            .map(|c| Column::builtin(c, "text"))
            .collect();
        let target: Vec<Column> = USERS_COLUMNS.iter().map(|c| Column::builtin(c, "text")).collect();
        let desc =
            TableDescriptor::resolve(USERS_TABLE, &source, &target, &ColumnManifest::default())
                .unwrap();
        let sql = build_upsert_sql("public", &desc);
        assert!(sql.contains("$10::\"text\", now(), $11::\"text\""));
        assert!(sql.contains("\"updated_at\" = EXCLUDED.\"updated_at\""));
        assert_eq!(param_count(&desc), USERS_COLUMNS.len() - 1);
    }

    #[test]
    fn test_row_params_follow_binding_order() {
        let desc = monitors();
        let columns: Arc<[String]> =
            vec!["active".to_string(), "id".to_string(), "name".to_string()].into();
        let row = Row::new(columns, vec![Some("true".into()), Some("7".into()), None]);
        let params = row_params(&desc, &row).unwrap();
        assert_eq!(params, vec![Some("7"), None, Some("true")]);
    }

    #[test]
    fn test_row_params_reject_missing_column() {
        let desc = monitors();
        let columns: Arc<[String]> = vec!["id".to_string()].into();
        let row = Row::new(columns, vec![Some("7".into())]);
        assert!(row_params(&desc, &row).is_err());
    }

    #[test]
    fn test_setval_sql() {
        let sql = build_setval_sql("public", &SequenceDescriptor::for_table("monitors"));
        assert_eq!(
            sql,
            "SELECT setval('\"public\".\"monitors_id_seq\"'::regclass, \
             COALESCE(MAX(\"id\"), 1), MAX(\"id\") IS NOT NULL) FROM \"public\".\"monitors\""
        );
    }
}
