//! PostgreSQL target database operations.

use crate::catalog::{qualify_table, Column, SequenceDescriptor, TableDescriptor};
use crate::error::{MigrateError, Result};
use crate::source::Row;
use crate::target::{build_setval_sql, build_upsert_sql, param_count, row_params, TargetWriter};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::types::{ToSql, Type};
use tracing::{debug, error};

/// PostgreSQL target pool implementation.
pub struct PgTargetPool {
    pool: Pool,
}

impl PgTargetPool {
    /// Connect to the Supabase database.
    pub async fn connect(conn: &str) -> Result<Self> {
        let pool = crate::tls::connect_pool(conn, "target").await?;
        Ok(Self { pool })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }
}

#[async_trait]
impl TargetWriter for PgTargetPool {
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let client = self.client("getting connection for target columns").await?;

        let query = r#"
            SELECT column_name::text, udt_schema::text, udt_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client.query(query, &[&schema, &table]).await?;

        let columns: Vec<Column> = rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                udt_schema: row.get(1),
                udt_name: row.get(2),
            })
            .collect();

        debug!("Loaded {} target columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn upsert_rows(
        &self,
        schema: &str,
        table: &TableDescriptor,
        rows: &[Row],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let client = self.client("getting connection for upsert").await?;

        // Parameters are declared text so the explicit casts in the statement
        // do the conversion to each column's type.
        let sql = build_upsert_sql(schema, table);
        let types = vec![Type::TEXT; param_count(table)];
        let stmt = client.prepare_typed(&sql, &types).await?;

        let mut total = 0u64;
        for row in rows {
            let params = row_params(table, row)?;
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            if let Err(e) = client.execute(&stmt, &refs).await {
                error!(
                    "Upsert failed for {}.{} (id={}): {}",
                    schema,
                    table.name,
                    row.get(crate::catalog::ID_COLUMN).unwrap_or("?"),
                    e
                );
                return Err(MigrateError::Target(e));
            }
            total += 1;
        }

        Ok(total)
    }

    async fn reset_sequence(&self, schema: &str, seq: &SequenceDescriptor) -> Result<i64> {
        let client = self.client("getting connection for sequence reset").await?;

        let sql = build_setval_sql(schema, seq);
        let row = client.query_one(&sql, &[]).await?;
        let value: i64 = row.get(0);

        debug!("Reset {}.{} to {}", schema, seq.sequence, value);
        Ok(value)
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.client("getting connection for target row count").await?;

        let sql = format!("SELECT COUNT(*) FROM {}", qualify_table(schema, table));
        let row = client.query_one(&sql, &[]).await?;

        Ok(row.get(0))
    }
}
