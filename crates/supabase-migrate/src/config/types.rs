//! Configuration type definitions.

use crate::catalog::ColumnManifest;
use std::fmt;
use std::path::PathBuf;

/// Default rows per paginated read.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default schema on both sides.
pub const DEFAULT_SCHEMA: &str = "public";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    /// Legacy database configuration.
    pub source: SourceConfig,

    /// Supabase database configuration.
    pub target: TargetConfig,

    /// Supabase auth admin credentials.
    pub auth: AuthConfig,

    /// Migration behavior configuration.
    pub migration: MigrationConfig,

    /// Pinned column lists for non-users tables.
    pub manifest: ColumnManifest,
}

/// Legacy (source) database configuration.
#[derive(Clone)]
pub struct SourceConfig {
    /// Postgres connection string, optionally carrying `sslmode`.
    pub url: String,
}

/// Supabase (target) database configuration.
#[derive(Clone)]
pub struct TargetConfig {
    /// Postgres connection string, optionally carrying `sslmode`.
    pub url: String,
}

/// Supabase project credentials used for auth admin calls.
#[derive(Clone)]
pub struct AuthConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub project_url: String,

    /// Service-role key.
    pub service_role_key: String,
}

/// Migration behavior configuration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Read and log only; no writes anywhere.
    pub dry_run: bool,

    /// Rows per paginated read.
    pub batch_size: usize,

    /// Maximum rows copied per table.
    pub limit: Option<usize>,

    /// Allow-list for the table copy stage. `users` always runs.
    pub tables: Option<Vec<String>>,

    /// Append log lines to this file as well as stdout.
    pub log_file: Option<PathBuf>,

    /// Schema holding the tables on both sides.
    pub schema: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            tables: None,
            log_file: None,
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Whether the copy stage should process `table`.
    pub fn includes_table(&self, table: &str) -> bool {
        if table == crate::catalog::USERS_TABLE {
            return true;
        }
        match &self.tables {
            Some(allow) => allow.iter().any(|t| t == table),
            None => true,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("url", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("url", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("project_url", &self.project_url)
            .field("service_role_key", &"[REDACTED]")
            .finish()
    }
}
