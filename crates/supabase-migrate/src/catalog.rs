//! Table catalog: copy order, column bindings and sequence names.
//!
//! The catalog turns the column lists reported by both databases into a
//! [`TableDescriptor`] before any row moves, so a source/target mismatch fails
//! the run at startup rather than halfway through a table.

use crate::error::{MigrateError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// The users table, always migrated first and always included.
pub const USERS_TABLE: &str = "users";

/// Primary key column shared by every migrated table.
pub const ID_COLUMN: &str = "id";

/// Linkage column pointing at the auth provider's user record.
pub const AUTH_USER_ID_COLUMN: &str = "auth_user_id";

/// Email column used when creating auth identities.
pub const EMAIL_COLUMN: &str = "email";

/// Column stamped with `now()` instead of the source value.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Tables in foreign-key dependency order.
pub const TABLE_ORDER: &[&str] = &[
    "users",
    "monitors",
    "checks",
    "escalation_rules",
    "incidents",
    "incident_roles",
    "notification_logs",
    "status_pages",
    "status_page_monitors",
    "status_page_subscribers",
    "subscriptions",
    "usage_records",
    "oncall_schedules",
    "oncall_shifts",
    "cover_requests",
    "services",
    "webhooks",
    "webhook_logs",
    "error_projects",
    "error_groups",
    "error_events",
];

/// Insert column list for `users`; order is significant.
pub const USERS_COLUMNS: &[&str] = &[
    "id",
    "auth_user_id",
    "email",
    "plan",
    "stripe_customer_id",
    "stripe_subscription_id",
    "telegram_chat_id",
    "webhook_url",
    "is_active",
    "created_at",
    "updated_at",
    "first_name",
    "last_name",
    "phone",
    "timezone",
    "avatar_url",
    "alerts_enabled",
    "alerts_paused_from",
    "alerts_paused_until",
    "oauth_provider",
    "oauth_id",
    "password_reset_token",
    "password_reset_expires_at",
    "onboarding_completed",
    "onboarding_email_j1_sent",
    "onboarding_email_j3_sent",
];

/// Check whether a table is part of the migration.
pub fn is_known_table(name: &str) -> bool {
    TABLE_ORDER.contains(&name)
}

/// Column metadata as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Schema of the column's type (`pg_catalog` for built-ins).
    pub udt_schema: String,

    /// Type name, e.g. `int8`, `timestamptz`, `_text`.
    pub udt_name: String,
}

impl Column {
    /// Built-in typed column; handy for tests and fixtures.
    pub fn builtin(name: &str, udt_name: &str) -> Self {
        Self {
            name: name.to_string(),
            udt_schema: "pg_catalog".to_string(),
            udt_name: udt_name.to_string(),
        }
    }

    /// SQL cast suffix binding a text parameter to this column's type.
    pub fn cast(&self) -> String {
        if self.udt_schema == "pg_catalog" || self.udt_schema.is_empty() {
            format!("::{}", quote_ident(&self.udt_name))
        } else {
            format!(
                "::{}.{}",
                quote_ident(&self.udt_schema),
                quote_ident(&self.udt_name)
            )
        }
    }
}

/// How one insert column receives its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingValue {
    /// Positional text parameter cast to the target type.
    Param { cast: String },
    /// Server-side `now()`.
    Now,
}

/// One column of an upsert statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub name: String,
    pub value: BindingValue,
}

/// Validated description of a table to copy.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,

    /// Columns selected from the source, in order.
    pub read_columns: Vec<String>,

    /// Columns written to the target, in order.
    pub bindings: Vec<ColumnBinding>,
}

impl TableDescriptor {
    /// Reconcile the source and target column lists for `table`.
    pub fn resolve(
        table: &str,
        source: &[Column],
        target: &[Column],
        manifest: &ColumnManifest,
    ) -> Result<Self> {
        if source.is_empty() {
            return Err(MigrateError::schema(table, "table not found in source database"));
        }
        if target.is_empty() {
            return Err(MigrateError::schema(table, "table not found in target database"));
        }

        if table == USERS_TABLE {
            return Self::resolve_users(source, target);
        }

        let columns: Vec<String> = match manifest.columns_for(table) {
            Some(pinned) => {
                require_columns(table, "source", source, pinned.iter().map(String::as_str))?;
                require_columns(table, "target", target, pinned.iter().map(String::as_str))?;
                pinned.to_vec()
            }
            None => {
                let source_names: BTreeSet<&str> = source.iter().map(|c| c.name.as_str()).collect();
                let target_names: BTreeSet<&str> = target.iter().map(|c| c.name.as_str()).collect();
                if source_names != target_names {
                    let only_source: Vec<&str> =
                        source_names.difference(&target_names).copied().collect();
                    let only_target: Vec<&str> =
                        target_names.difference(&source_names).copied().collect();
                    return Err(MigrateError::schema(
                        table,
                        format!(
                            "column lists differ (only in source: [{}], only in target: [{}])",
                            only_source.join(", "),
                            only_target.join(", ")
                        ),
                    ));
                }
                source.iter().map(|c| c.name.clone()).collect()
            }
        };

        if !columns.iter().any(|c| c == ID_COLUMN) {
            return Err(MigrateError::schema(table, "no `id` column"));
        }

        let bindings = columns
            .iter()
            .map(|name| param_binding(table, name, target))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: table.to_string(),
            read_columns: columns,
            bindings,
        })
    }

    fn resolve_users(source: &[Column], target: &[Column]) -> Result<Self> {
        let read_columns: Vec<String> = USERS_COLUMNS
            .iter()
            .filter(|c| **c != UPDATED_AT_COLUMN)
            .map(|c| c.to_string())
            .collect();

        require_columns(
            USERS_TABLE,
            "source",
            source,
            read_columns.iter().map(String::as_str),
        )?;
        require_columns(USERS_TABLE, "target", target, USERS_COLUMNS.iter().copied())?;

        let bindings = USERS_COLUMNS
            .iter()
            .map(|name| {
                if *name == UPDATED_AT_COLUMN {
                    Ok(ColumnBinding {
                        name: name.to_string(),
                        value: BindingValue::Now,
                    })
                } else {
                    param_binding(USERS_TABLE, name, target)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: USERS_TABLE.to_string(),
            read_columns,
            bindings,
        })
    }

    /// Names of all insert columns.
    pub fn column_names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }
}

fn param_binding(table: &str, name: &str, target: &[Column]) -> Result<ColumnBinding> {
    let column = target
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| MigrateError::schema(table, format!("target has no column `{}`", name)))?;
    Ok(ColumnBinding {
        name: name.to_string(),
        value: BindingValue::Param {
            cast: column.cast(),
        },
    })
}

fn require_columns<'a>(
    table: &str,
    side: &str,
    available: &[Column],
    required: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let missing: Vec<&str> = required
        .filter(|name| !available.iter().any(|c| c.name == *name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::schema(
            table,
            format!("{} is missing columns: {}", side, missing.join(", ")),
        ))
    }
}

/// Primary-key counter belonging to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDescriptor {
    pub table: String,
    pub sequence: String,
}

impl SequenceDescriptor {
    /// Derive `<table>_id_seq`.
    pub fn for_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            sequence: format!("{}_id_seq", table),
        }
    }
}

/// Sequences for every table in [`TABLE_ORDER`].
pub fn sequences() -> Vec<SequenceDescriptor> {
    TABLE_ORDER
        .iter()
        .map(|t| SequenceDescriptor::for_table(t))
        .collect()
}

/// Optional YAML file pinning column lists per table.
///
/// ```yaml
/// tables:
///   monitors: [id, user_id, name, url, interval_seconds, created_at]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnManifest {
    #[serde(default)]
    tables: BTreeMap<String, Vec<String>>,
}

impl ColumnManifest {
    /// Load a manifest from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a manifest from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: ColumnManifest = serde_yaml::from_str(yaml)?;
        for (table, columns) in &manifest.tables {
            if columns.is_empty() {
                return Err(MigrateError::Config(format!(
                    "manifest lists no columns for '{}'",
                    table
                )));
            }
        }
        Ok(manifest)
    }

    /// Tables with pinned column lists.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Pinned columns for a table, if any.
    pub fn columns_for(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}
