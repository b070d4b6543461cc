//! PostgreSQL source database operations.

use crate::catalog::{qualify_table, quote_ident, Column, ID_COLUMN};
use crate::error::{MigrateError, Result};
use crate::source::{Row, SourceReader};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::sync::Arc;
use tracing::debug;

/// PostgreSQL source pool implementation.
pub struct PgSourcePool {
    pool: Pool,
}

impl PgSourcePool {
    /// Connect to the legacy database.
    pub async fn connect(conn: &str) -> Result<Self> {
        let pool = crate::tls::connect_pool(conn, "source").await?;
        Ok(Self { pool })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }
}

/// Build the paginated SELECT for a batch.
///
/// Every column is cast to text; the writer casts it back to the target type.
pub(crate) fn build_select_sql(schema: &str, table: &str, columns: &[String]) -> String {
    let col_list: Vec<String> = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(c)))
        .collect();
    format!(
        "SELECT {} FROM {} ORDER BY {} ASC LIMIT $1 OFFSET $2",
        col_list.join(", "),
        qualify_table(schema, table),
        quote_ident(ID_COLUMN)
    )
}

#[async_trait]
impl SourceReader for PgSourcePool {
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let client = self.client("getting connection for source columns").await?;

        let query = r#"
            SELECT column_name::text, udt_schema::text, udt_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client
            .query(query, &[&schema, &table])
            .await
            .map_err(MigrateError::Source)?;

        let columns: Vec<Column> = rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                udt_schema: row.get(1),
                udt_name: row.get(2),
            })
            .collect();

        debug!("Loaded {} source columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.client("getting connection for source row count").await?;

        let sql = format!("SELECT COUNT(*) FROM {}", qualify_table(schema, table));
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(MigrateError::Source)?;

        Ok(row.get(0))
    }

    async fn read_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Row>> {
        let client = self.client("getting connection for source batch").await?;

        let sql = build_select_sql(schema, table, columns);
        let rows = client
            .query(&sql, &[&limit, &offset])
            .await
            .map_err(MigrateError::Source)?;

        let names: Arc<[String]> = columns.to_vec().into();
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(names.len());
            for idx in 0..names.len() {
                let value: Option<String> = row.try_get(idx).map_err(MigrateError::Source)?;
                values.push(value);
            }
            result.push(Row::new(names.clone(), values));
        }

        Ok(result)
    }
}
