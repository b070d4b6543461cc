//! Configuration validation.

use super::Config;
use crate::catalog::{self, USERS_TABLE};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.url.is_empty() {
        return Err(MigrateError::Config("source connection string is required".into()));
    }
    if config.target.url.is_empty() {
        return Err(MigrateError::Config("target connection string is required".into()));
    }

    // Cannot migrate to the same database
    if config.source.url == config.target.url {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let project_url = &config.auth.project_url;
    if !(project_url.starts_with("https://") || project_url.starts_with("http://")) {
        return Err(MigrateError::Config(format!(
            "project URL must start with http:// or https://, got '{}'",
            project_url
        )));
    }

    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(MigrateError::Config("batch size must be at least 1".into()));
    }
    if let Some(0) = migration.limit {
        return Err(MigrateError::Config("limit must be at least 1".into()));
    }
    if migration.schema.is_empty() {
        return Err(MigrateError::Config("schema cannot be empty".into()));
    }

    if let Some(ref tables) = migration.tables {
        let unknown: Vec<&str> = tables
            .iter()
            .map(String::as_str)
            .filter(|t| !catalog::is_known_table(t))
            .collect();
        if !unknown.is_empty() {
            return Err(MigrateError::Config(format!(
                "unknown tables in --tables: {}",
                unknown.join(", ")
            )));
        }
    }

    for table in config.manifest.tables() {
        if !catalog::is_known_table(table) {
            return Err(MigrateError::Config(format!(
                "manifest names unknown table '{}'",
                table
            )));
        }
        if table == USERS_TABLE {
            return Err(MigrateError::Config(
                "manifest cannot override the users column list".into(),
            ));
        }
    }

    Ok(())
}
