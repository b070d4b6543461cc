//! Primary-key sequence resynchronization.

use crate::catalog::SequenceDescriptor;
use crate::error::Result;
use crate::target::TargetWriter;
use serde::Serialize;
use tracing::info;

/// Value a sequence was set to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SequenceReport {
    pub table: String,
    pub sequence: String,
    pub value: i64,
}

/// Move every sequence up to its table's `max(id)` (1 when empty).
///
/// Does nothing in dry-run. Setting the same value twice is harmless, so a
/// rerun after a failure may simply start over.
pub async fn resync_sequences(
    target: &dyn TargetWriter,
    schema: &str,
    sequences: &[SequenceDescriptor],
    dry_run: bool,
) -> Result<Vec<SequenceReport>> {
    if dry_run {
        info!("[dry-run] skipping reset of {} sequences", sequences.len());
        return Ok(Vec::new());
    }

    let mut reports = Vec::with_capacity(sequences.len());
    for seq in sequences {
        let value = target.reset_sequence(schema, seq).await?;
        info!("{} -> {}", seq.sequence, value);
        reports.push(SequenceReport {
            table: seq.table.clone(),
            sequence: seq.sequence.clone(),
            value,
        });
    }

    Ok(reports)
}
