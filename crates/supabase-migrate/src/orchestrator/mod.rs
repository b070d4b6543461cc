//! Migration orchestrator - main workflow coordinator.
//!
//! Stages run strictly in order: schema validation, identity reconciliation,
//! ordered table copy, sequence resync. The first error stops the run.

use crate::catalog::{self, TableDescriptor, TABLE_ORDER, USERS_TABLE};
use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::identity::{self, CredentialMap, IdentityProvider, SupabaseAuthClient};
use crate::sequence::{self, SequenceReport};
use crate::source::{PgSourcePool, Row, SourceReader};
use crate::target::{PgTargetPool, TargetWriter};
use crate::transfer::{self, CopyOptions, RowTransform};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    identity: Arc<dyn IdentityProvider>,
}

/// Outcome of copying one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,

    /// Left out by `--tables`; nothing was read or written.
    pub skipped: bool,

    pub rows_in_source: i64,
    pub rows_read: i64,
    pub rows_written: i64,
    pub batches: usize,

    /// Target row count after the copy; `None` when skipped or in dry-run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_rows: Option<i64>,
}

impl TableReport {
    fn skipped(table: &str) -> Self {
        Self {
            table: table.to_string(),
            skipped: true,
            rows_in_source: 0,
            rows_read: 0,
            rows_written: 0,
            batches: 0,
            target_rows: None,
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Whether writes were suppressed.
    pub dry_run: bool,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table outcome, in processing order.
    pub tables: Vec<TableReport>,

    /// Total rows upserted.
    pub rows_transferred: i64,

    /// Auth identities created.
    pub identities_created: usize,

    /// Sequences reset (empty in dry-run).
    pub sequences: Vec<SequenceReport>,

    /// Temporary passwords of created identities, keyed by email.
    #[serde(skip_serializing_if = "CredentialMap::is_empty")]
    pub temporary_credentials: CredentialMap,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Connect to both databases and the auth provider.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = PgSourcePool::connect(&config.source.url).await?;
        let target = PgTargetPool::connect(&config.target.url).await?;
        let identity = SupabaseAuthClient::new(&config.auth)?;

        Ok(Self::with_components(
            config,
            Arc::new(source),
            Arc::new(target),
            Arc::new(identity),
        ))
    }

    /// Build an orchestrator over existing components.
    pub fn with_components(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            identity,
        }
    }

    /// Run the migration.
    pub async fn run(self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let migration = &self.config.migration;
        let dry_run = migration.dry_run;

        info!(
            "Starting migration run {}{}",
            run_id,
            if dry_run { " (dry-run: no writes)" } else { "" }
        );

        // Stage 1: column lists for every selected table, before any write.
        let descriptors = self
            .validate_schema()
            .instrument(info_span!("schema"))
            .await?;

        // Stage 2: identities for users lacking a linkage.
        let users = descriptors
            .iter()
            .find(|d| d.name == USERS_TABLE)
            .ok_or_else(|| MigrateError::schema(USERS_TABLE, "not resolved"))?;
        let reconciliation = async {
            let rows = self.read_all(users).await?;
            info!("Loaded {} users for reconciliation", rows.len());
            identity::reconcile_users(&rows, self.identity.as_ref(), dry_run).await
        }
        .instrument(info_span!("identity"))
        .await?;
        let linkage = reconciliation.transform(dry_run);

        // Stage 3: ordered copy.
        let opts = CopyOptions {
            schema: migration.schema.clone(),
            batch_size: migration.batch_size,
            limit: migration.limit,
            dry_run,
        };
        let mut reports = Vec::with_capacity(TABLE_ORDER.len());
        for table in TABLE_ORDER {
            let Some(desc) = descriptors.iter().find(|d| d.name == *table) else {
                reports.push(TableReport::skipped(table));
                continue;
            };

            let transform: Option<&dyn RowTransform> = if *table == USERS_TABLE {
                Some(&linkage)
            } else {
                None
            };

            let stats = transfer::copy_table(
                self.source.as_ref(),
                self.target.as_ref(),
                desc,
                transform,
                &opts,
            )
            .instrument(info_span!("copy", table = %table))
            .await?;

            let target_rows = if dry_run {
                None
            } else {
                let count = self.target.row_count(&migration.schema, table).await?;
                debug!("{}: {} rows in target", table, count);
                Some(count)
            };

            reports.push(TableReport {
                table: table.to_string(),
                skipped: false,
                rows_in_source: stats.rows_in_source,
                rows_read: stats.rows_read,
                rows_written: stats.rows_written,
                batches: stats.batches,
                target_rows,
            });
        }

        // Stage 4: every sequence, whether or not its table was selected.
        let sequences = sequence::resync_sequences(
            self.target.as_ref(),
            &migration.schema,
            &catalog::sequences(),
            dry_run,
        )
        .instrument(info_span!("sequences"))
        .await?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred: i64 = reports.iter().map(|r| r.rows_written).sum();

        info!(
            "Migration {} finished in {:.1}s: {} rows, {} identities created",
            run_id,
            duration,
            rows_transferred,
            reconciliation.created()
        );

        Ok(MigrationResult {
            run_id,
            status: if dry_run { "dry_run" } else { "completed" }.to_string(),
            dry_run,
            started_at,
            completed_at,
            duration_seconds: duration,
            tables: reports,
            rows_transferred,
            identities_created: reconciliation.created(),
            sequences,
            temporary_credentials: reconciliation.credentials,
        })
    }

    /// Resolve the column list of every table the run will copy.
    async fn validate_schema(&self) -> Result<Vec<TableDescriptor>> {
        let migration = &self.config.migration;
        let mut descriptors = Vec::new();

        for table in TABLE_ORDER {
            if !migration.includes_table(table) {
                continue;
            }
            let source_cols = self.source.columns(&migration.schema, table).await?;
            let target_cols = self.target.columns(&migration.schema, table).await?;
            let desc = TableDescriptor::resolve(
                table,
                &source_cols,
                &target_cols,
                &self.config.manifest,
            )?;
            debug!("{}: {} columns", table, desc.bindings.len());
            descriptors.push(desc);
        }

        info!("Schema validated for {} tables", descriptors.len());
        Ok(descriptors)
    }

    /// Every row of a table, independent of `--limit`.
    async fn read_all(&self, table: &TableDescriptor) -> Result<Vec<Row>> {
        let schema = &self.config.migration.schema;
        let batch_size =
            i64::try_from(self.config.migration.batch_size.max(1)).unwrap_or(i64::MAX);
        let total = self.source.row_count(schema, &table.name).await?;

        let mut rows = Vec::with_capacity(total.max(0) as usize);
        let mut offset = 0i64;
        while offset < total {
            let batch = self
                .source
                .read_batch(schema, &table.name, &table.read_columns, offset, batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            offset += batch.len() as i64;
            rows.extend(batch);
        }
        Ok(rows)
    }
}
