//! # supabase-migrate
//!
//! One-shot migration of a legacy PostgreSQL database into a Supabase project.
//!
//! A run goes through four stages, strictly in order:
//!
//! - **Schema validation** of every copied table against both databases
//! - **Identity reconciliation**: users without an `auth_user_id` get a
//!   pre-confirmed Supabase auth identity and a temporary password
//! - **Ordered table copy** in foreign-key order, batched and upserted by `id`
//! - **Sequence resync** of every `<table>_id_seq` to the table's `max(id)`
//!
//! ## Example
//!
//! ```rust,no_run
//! use supabase_migrate::{Config, MigrationConfig, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> supabase_migrate::Result<()> {
//!     let config = Config::from_env(MigrationConfig::default())?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod sequence;
pub mod source;
pub mod target;
pub mod tls;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use catalog::{ColumnManifest, TableDescriptor, TABLE_ORDER};
pub use config::{AuthConfig, Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use identity::{CredentialMap, IdentityProvider, SupabaseAuthClient};
pub use orchestrator::{MigrationResult, Orchestrator, TableReport};
pub use source::{PgSourcePool, Row, SourceReader};
pub use target::{PgTargetPool, TargetWriter};
pub use transfer::{CopyOptions, RowTransform, TableStats};
