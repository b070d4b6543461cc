//! Source (legacy) database access.

mod postgres;

pub use postgres::PgSourcePool;

use crate::catalog::{Column, ID_COLUMN};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One migrated row: an ordered mapping of column name to text value.
///
/// Values travel as their Postgres text representation and are cast back to
/// the target column type on insert, so no per-type conversion happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Row {
    /// Create a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Whether the row carries `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Value of `column`; `None` for SQL NULL or an absent column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.position(column)
            .and_then(|idx| self.values[idx].as_deref())
    }

    /// Replace the value of an existing column. Returns false if absent.
    pub fn set(&mut self, column: &str, value: Option<String>) -> bool {
        match self.position(column) {
            Some(idx) => {
                self.values[idx] = value;
                true
            }
            None => false,
        }
    }

    /// Integer primary key, if present and numeric.
    pub fn id(&self) -> Option<i64> {
        self.get(ID_COLUMN).and_then(|v| v.parse().ok())
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Read access to the legacy database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Column list of a table, empty if the table does not exist.
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;

    /// Exact row count of a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Read `limit` rows starting at `offset`, ordered by `id` ascending.
    async fn read_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Row>>;
}
