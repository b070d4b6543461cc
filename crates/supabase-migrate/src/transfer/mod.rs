//! Batched table copy engine.
//!
//! Rows are paged out of the source by ascending `id` and upserted into the
//! target one batch at a time. Only one batch is resident at once and reads
//! never overlap writes.

use crate::catalog::TableDescriptor;
use crate::error::Result;
use crate::source::{Row, SourceReader};
use crate::target::TargetWriter;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-row rewrite applied between read and write.
pub trait RowTransform: Send + Sync {
    fn apply(&self, row: Row) -> Result<Row>;
}

/// Options for copying one table.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub schema: String,
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

/// Statistics from copying one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Rows present in the source table.
    pub rows_in_source: i64,

    /// Rows read from the source.
    pub rows_read: i64,

    /// Rows upserted into the target (0 in dry-run).
    pub rows_written: i64,

    /// Batches fetched.
    pub batches: usize,

    /// Wall time spent on the table.
    pub elapsed: Duration,
}

/// Number of rows to copy: the source count, capped by `limit`.
pub fn effective_ceiling(total: i64, limit: Option<usize>) -> i64 {
    match limit {
        Some(limit) => total.min(i64::try_from(limit).unwrap_or(i64::MAX)),
        None => total,
    }
}

/// Copy one table from source to target.
///
/// Any read, transform or write failure aborts the copy; rows already
/// upserted stay in place and a rerun converges through the upsert.
pub async fn copy_table(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    table: &TableDescriptor,
    transform: Option<&dyn RowTransform>,
    opts: &CopyOptions,
) -> Result<TableStats> {
    let start = Instant::now();
    let mut stats = TableStats::default();

    let total = source.row_count(&opts.schema, &table.name).await?;
    stats.rows_in_source = total;

    if total == 0 {
        info!("{}: 0 rows", table.name);
        stats.elapsed = start.elapsed();
        return Ok(stats);
    }

    let ceiling = effective_ceiling(total, opts.limit);
    let batch_size = i64::try_from(opts.batch_size.max(1)).unwrap_or(i64::MAX);
    info!(
        "{}: {} rows in source, copying {}{}",
        table.name,
        total,
        ceiling,
        if opts.dry_run { " (dry-run)" } else { "" }
    );

    let mut offset = 0i64;
    while offset < ceiling {
        let take = batch_size.min(ceiling - offset);
        let rows = source
            .read_batch(&opts.schema, &table.name, &table.read_columns, offset, take)
            .await?;
        stats.batches += 1;

        // The source shrank under us; nothing left to page through.
        if rows.is_empty() {
            debug!("{}: empty batch at offset {}", table.name, offset);
            break;
        }
        let fetched = rows.len() as i64;
        stats.rows_read += fetched;

        let rows = match transform {
            Some(t) => rows
                .into_iter()
                .map(|r| t.apply(r))
                .collect::<Result<Vec<_>>>()?,
            None => rows,
        };

        if opts.dry_run {
            debug!(
                "[dry-run] {}: would upsert {} rows (offset {})",
                table.name, fetched, offset
            );
        } else {
            let written = target.upsert_rows(&opts.schema, table, &rows).await?;
            stats.rows_written += written as i64;
            debug!(
                "{}: upserted {} rows (offset {})",
                table.name, written, offset
            );
        }

        offset += fetched;
    }

    stats.elapsed = start.elapsed();
    info!(
        "{}: {} {} rows in {} batches ({:.1}s)",
        table.name,
        if opts.dry_run { "read" } else { "copied" },
        if opts.dry_run { stats.rows_read } else { stats.rows_written },
        stats.batches,
        stats.elapsed.as_secs_f64()
    );

    Ok(stats)
}
