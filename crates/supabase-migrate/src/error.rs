//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration and schema errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for database connectivity errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for auth provider failures.
pub const EXIT_IDENTITY_ERROR: u8 = 3;
/// Exit code for rejected writes.
pub const EXIT_TRANSFER_ERROR: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid flag, malformed manifest, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more required environment variables are unset or empty.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    /// Source and target disagree on a table's shape.
    #[error("Schema mismatch for table {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[source] tokio_postgres::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// The auth provider refused to create an identity.
    #[error("Failed to create auth user for {email}: {message}")]
    Identity { email: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// HTTP transport error talking to the auth provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a SchemaMismatch error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SchemaMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Identity error
    pub fn identity(email: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Identity {
            email: email.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::MissingEnv(_)
            | MigrateError::SchemaMismatch { .. }
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::Source(e) | MigrateError::Target(e) => {
                postgres_exit_code(e.is_closed(), e.code().is_some())
            }
            MigrateError::Pool { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Identity { .. } | MigrateError::Http(_) => EXIT_IDENTITY_ERROR,
            MigrateError::Transfer { .. } => EXIT_TRANSFER_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Exit code for a driver error.
///
/// Only a server-side rejection carries a SQLSTATE; a closed connection or a
/// transport failure has none.
fn postgres_exit_code(closed: bool, has_sqlstate: bool) -> u8 {
    if closed || !has_sqlstate {
        EXIT_CONNECTION_ERROR
    } else {
        EXIT_TRANSFER_ERROR
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
