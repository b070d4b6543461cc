//! Identity reconciliation against the Supabase auth provider.
//!
//! Every legacy user must carry an `auth_user_id` before the `users` table is
//! upserted. Users without one get a fresh auth identity, created with a
//! random temporary password that is reported back to the operator.

mod supabase;

pub use supabase::SupabaseAuthClient;

use crate::catalog::{AUTH_USER_ID_COLUMN, EMAIL_COLUMN, USERS_TABLE};
use crate::error::{MigrateError, Result};
use crate::source::Row;
use crate::transfer::RowTransform;
use async_trait::async_trait;
use rand::RngCore;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Entropy of a temporary password, in bytes.
pub const TEMP_PASSWORD_BYTES: usize = 12;

/// Creates identities in the auth provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a pre-confirmed identity and return its id.
    async fn create_user(&self, email: &str, password: &str) -> Result<String>;
}

/// Generate a hex-encoded temporary password from the OS random source.
pub fn generate_temp_password() -> String {
    let mut bytes = [0u8; TEMP_PASSWORD_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Temporary passwords keyed by email, for users created during this run.
#[derive(Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CredentialMap(BTreeMap<String, String>);

impl CredentialMap {
    pub fn insert(&mut self, email: impl Into<String>, password: impl Into<String>) {
        self.0.insert(email.into(), password.into());
    }

    pub fn get(&self, email: &str) -> Option<&str> {
        self.0.get(email).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for CredentialMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Outcome of reconciling the users table.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// New `auth_user_id` per user id.
    pub linkages: HashMap<i64, String>,

    /// Temporary passwords for created identities.
    pub credentials: CredentialMap,

    /// Users that already carried a linkage.
    pub already_linked: usize,

    /// Users that would have been created (dry-run only).
    pub skipped_dry_run: usize,
}

impl Reconciliation {
    /// Identities created in this run.
    pub fn created(&self) -> usize {
        self.linkages.len()
    }

    /// Row transform injecting the new linkages into `users` rows.
    pub fn transform(&self, dry_run: bool) -> LinkageTransform {
        LinkageTransform {
            linkages: self.linkages.clone(),
            dry_run,
        }
    }
}

/// Ensure every user row has an auth identity.
///
/// Any provider failure aborts the run: a user row without a linkage cannot
/// be upserted meaningfully.
pub async fn reconcile_users(
    users: &[Row],
    provider: &dyn IdentityProvider,
    dry_run: bool,
) -> Result<Reconciliation> {
    let mut result = Reconciliation::default();

    for row in users {
        if row.get(AUTH_USER_ID_COLUMN).is_some() {
            result.already_linked += 1;
            continue;
        }

        let id = row.id().ok_or_else(|| {
            MigrateError::transfer(USERS_TABLE, "user row without a numeric id")
        })?;
        let email = row.get(EMAIL_COLUMN).ok_or_else(|| {
            MigrateError::identity(format!("<user {}>", id), "user has no email")
        })?;

        if dry_run {
            info!("[dry-run] would create auth user for {} (user {})", email, id);
            result.skipped_dry_run += 1;
            continue;
        }

        let password = generate_temp_password();
        let auth_user_id = provider.create_user(email, &password).await?;
        debug!("Created auth user {} for {}", auth_user_id, email);

        result.linkages.insert(id, auth_user_id);
        result.credentials.insert(email, password);
    }

    info!(
        "Identity reconciliation: {} already linked, {} created{}",
        result.already_linked,
        result.created(),
        if dry_run {
            format!(", {} pending (dry-run)", result.skipped_dry_run)
        } else {
            String::new()
        }
    );

    Ok(result)
}

/// Fills `auth_user_id` on `users` rows from the reconciliation result.
#[derive(Debug, Clone)]
pub struct LinkageTransform {
    linkages: HashMap<i64, String>,
    dry_run: bool,
}

impl RowTransform for LinkageTransform {
    fn apply(&self, mut row: Row) -> Result<Row> {
        if row.get(AUTH_USER_ID_COLUMN).is_some() {
            return Ok(row);
        }

        let id = row.id().ok_or_else(|| {
            MigrateError::transfer(USERS_TABLE, "user row without a numeric id")
        })?;

        match self.linkages.get(&id) {
            Some(auth_user_id) => {
                if !row.set(AUTH_USER_ID_COLUMN, Some(auth_user_id.clone())) {
                    return Err(MigrateError::transfer(
                        USERS_TABLE,
                        format!("row has no `{}` column", AUTH_USER_ID_COLUMN),
                    ));
                }
                Ok(row)
            }
            // Dry-run leaves the linkage null; whether the target accepts
            // that is never exercised because nothing is written.
            None if self.dry_run => Ok(row),
            None => Err(MigrateError::transfer(
                USERS_TABLE,
                format!("user {} has no auth identity after reconciliation", id),
            )),
        }
    }
}
