//! In-memory source and target databases for unit tests.

use crate::catalog::{Column, SequenceDescriptor, TableDescriptor, ID_COLUMN};
use crate::error::{MigrateError, Result};
use crate::source::{Row, SourceReader};
use crate::target::{row_params, TargetWriter};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Build a row from `(column, value)` pairs.
pub fn row(pairs: &[(&str, Option<&str>)]) -> Row {
    let columns: Arc<[String]> = pairs
        .iter()
        .map(|(c, _)| c.to_string())
        .collect::<Vec<_>>()
        .into();
    Row::new(
        columns,
        pairs.iter().map(|(_, v)| v.map(str::to_string)).collect(),
    )
}

#[derive(Default)]
struct MemoryTable {
    columns: Vec<Column>,
    rows: BTreeMap<i64, Row>,
}

/// Read-only table set recording every batch request.
#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    /// `(table, offset, limit)` per `read_batch` call.
    pub reads: Mutex<Vec<(String, i64, i64)>>,
}

impl MemorySource {
    pub fn add_table(&self, table: &str, columns: Vec<Column>, rows: Vec<Row>) {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        entry.columns = columns;
        for r in rows {
            entry.rows.insert(r.id().unwrap(), r);
        }
    }

    pub fn reads_for(&self, table: &str) -> Vec<(i64, i64)> {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == table)
            .map(|(_, o, l)| (*o, *l))
            .collect()
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn columns(&self, _schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.len() as i64)
            .unwrap_or(0))
    }

    async fn read_batch(
        &self,
        _schema: &str,
        table: &str,
        columns: &[String],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Row>> {
        self.reads
            .lock()
            .unwrap()
            .push((table.to_string(), offset, limit));

        let tables = self.tables.lock().unwrap();
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let projected: Arc<[String]> = columns.to_vec().into();
        Ok(t.rows
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|r| {
                let values = columns.iter().map(|c| r.get(c).map(str::to_string)).collect();
                Row::new(projected.clone(), values)
            })
            .collect())
    }
}

/// Writable table set keyed by `id`, counting every write.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    /// `(value, is_called)` per sequence, as `setval` leaves it.
    sequences: Mutex<BTreeMap<String, (i64, bool)>>,
    writes: AtomicUsize,
    /// Reject upserts into this table.
    pub fail_table: Option<String>,
}

impl MemoryTarget {
    /// Target rejecting every upsert into `table`.
    pub fn failing(table: &str) -> Self {
        Self {
            fail_table: Some(table.to_string()),
            ..Default::default()
        }
    }

    pub fn add_table(&self, table: &str, columns: Vec<Column>) {
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_string()).or_default().columns = columns;
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn sequence(&self, name: &str) -> Option<(i64, bool)> {
        self.sequences.lock().unwrap().get(name).copied()
    }

    /// Key the next `nextval()` on `name` would produce.
    pub fn next_id(&self, name: &str) -> i64 {
        match self.sequence(name) {
            Some((value, true)) => value + 1,
            Some((value, false)) => value,
            None => 1,
        }
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn columns(&self, _schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn upsert_rows(
        &self,
        _schema: &str,
        table: &TableDescriptor,
        rows: &[Row],
    ) -> Result<u64> {
        if self.fail_table.as_deref() == Some(table.name.as_str()) {
            return Err(MigrateError::transfer(
                &table.name,
                "duplicate key value violates unique constraint",
            ));
        }

        let mut tables = self.tables.lock().unwrap();
        let t = tables.entry(table.name.clone()).or_default();
        let columns: Arc<[String]> = table
            .bindings
            .iter()
            .map(|b| b.name.clone())
            .collect::<Vec<_>>()
            .into();

        for r in rows {
            // Same parameter check the real writer performs.
            row_params(table, r)?;
            let values = table
                .bindings
                .iter()
                .map(|b| match b.value {
                    crate::catalog::BindingValue::Now => Some("now()".to_string()),
                    crate::catalog::BindingValue::Param { .. } => r.get(&b.name).map(str::to_string),
                })
                .collect();
            let stored = Row::new(columns.clone(), values);
            let id = stored
                .id()
                .ok_or_else(|| MigrateError::transfer(&table.name, "row without id"))?;
            t.rows.insert(id, stored);
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(rows.len() as u64)
    }

    async fn reset_sequence(&self, _schema: &str, seq: &SequenceDescriptor) -> Result<i64> {
        let max = self
            .tables
            .lock()
            .unwrap()
            .get(&seq.table)
            .and_then(|t| t.rows.keys().next_back().copied());
        let state = match max {
            Some(max) => (max, true),
            None => (1, false),
        };
        self.sequences
            .lock()
            .unwrap()
            .insert(seq.sequence.clone(), state);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(state.0)
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.count(table) as i64)
    }
}

/// Simple `(id, name)` table shape.
pub fn id_name_columns() -> Vec<Column> {
    vec![Column::builtin(ID_COLUMN, "int8"), Column::builtin("name", "text")]
}

/// `(id, name)` rows with the given ids.
pub fn id_name_rows(ids: &[i64]) -> Vec<Row> {
    ids.iter()
        .map(|id| {
            let id = id.to_string();
            let name = format!("row-{}", id);
            row(&[("id", Some(id.as_str())), ("name", Some(name.as_str()))])
        })
        .collect()
}

/// Layer keeping the message of every event it sees.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CapturedLogs {
    /// Capture events on the current thread until the guard drops.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::registry().with(logs.clone());
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

struct MessageText(String);

impl Visit for MessageText {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut text = MessageText(String::new());
        event.record(&mut text);
        self.messages.lock().unwrap().push(text.0);
    }
}
