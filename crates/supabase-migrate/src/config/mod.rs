//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::catalog::ColumnManifest;
use crate::error::{MigrateError, Result};

/// Primary variable for the legacy connection string.
pub const ENV_SOURCE_URL: &str = "SOURCE_DATABASE_URL";
/// Fallback variable for the legacy connection string.
pub const ENV_SOURCE_URL_FALLBACK: &str = "DATABASE_URL";
/// Supabase Postgres connection string.
pub const ENV_TARGET_URL: &str = "SUPABASE_DB_URL";
/// Supabase project URL.
pub const ENV_PROJECT_URL: &str = "SUPABASE_URL";
/// Fallback variable for the Supabase project URL.
pub const ENV_PROJECT_URL_FALLBACK: &str = "NEXT_PUBLIC_SUPABASE_URL";
/// Supabase service-role key.
pub const ENV_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env(migration: MigrationConfig) -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), migration)
    }

    /// Resolve configuration through an arbitrary variable lookup.
    ///
    /// Every missing variable is collected so the operator sees the whole
    /// list at once instead of fixing them one run at a time.
    pub fn from_lookup<F>(lookup: F, migration: MigrationConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let source_url = first(&[ENV_SOURCE_URL, ENV_SOURCE_URL_FALLBACK]);
        let target_url = first(&[ENV_TARGET_URL]);
        let project_url = first(&[ENV_PROJECT_URL, ENV_PROJECT_URL_FALLBACK]);
        let service_role_key = first(&[ENV_SERVICE_ROLE_KEY]);

        let mut missing = Vec::new();
        if source_url.is_none() {
            missing.push(format!("{} (or {})", ENV_SOURCE_URL, ENV_SOURCE_URL_FALLBACK));
        }
        if target_url.is_none() {
            missing.push(ENV_TARGET_URL.to_string());
        }
        if project_url.is_none() {
            missing.push(format!("{} (or {})", ENV_PROJECT_URL, ENV_PROJECT_URL_FALLBACK));
        }
        if service_role_key.is_none() {
            missing.push(ENV_SERVICE_ROLE_KEY.to_string());
        }

        match (source_url, target_url, project_url, service_role_key) {
            (Some(source), Some(target), Some(project_url), Some(service_role_key)) => {
                let config = Config {
                    source: SourceConfig { url: source },
                    target: TargetConfig { url: target },
                    auth: AuthConfig {
                        project_url: project_url.trim_end_matches('/').to_string(),
                        service_role_key,
                    },
                    migration,
                    manifest: ColumnManifest::default(),
                };
                config.validate()?;
                Ok(config)
            }
            _ => Err(MigrateError::MissingEnv(missing)),
        }
    }

    /// Attach a column manifest, re-validating table names.
    pub fn with_manifest(mut self, manifest: ColumnManifest) -> Result<Self> {
        self.manifest = manifest;
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
