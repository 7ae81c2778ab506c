//! Error types for Dotforge

use thiserror::Error;

/// Result type alias using Dotforge's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Dotforge error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Backend errors
    #[error("Backend '{0}' is not registered. Supported backends: sqlite, memory, postgres.")]
    UnsupportedBackend(String),

    #[error("Failed to connect to {backend} backend: {message}")]
    Connection {
        backend: &'static str,
        message: String,
    },

    #[error("{op} failed on {backend} backend: {message}")]
    Query {
        backend: &'static str,
        op: &'static str,
        message: String,
    },

    #[error("Operation '{0}' is not supported by this backend")]
    UnsupportedOperation(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    // Migration errors
    #[error(
        "Schema is dirty at version {version}: a previous migration was interrupted. \
         Inspect the database, finish or revert the partial migration by hand, then \
         clear the dirty flag in the schema_migrations table."
    )]
    DirtySchema { version: i64 },

    #[error("Migration {version} ({name}) failed: {message}")]
    MigrationApply {
        version: u64,
        name: String,
        message: String,
    },

    // Credential errors
    #[error(
        "Plaintext credential rejected: {0}. Credentials may only reference a keychain \
         entry or an environment variable, never carry the secret itself."
    )]
    PlaintextCredential(String),

    #[error("Credential is missing required field '{0}'")]
    MissingRequiredField(&'static str),

    #[error("Credential '{name}' not found for {scope} '{scope_id}'")]
    CredentialNotFound {
        scope: &'static str,
        scope_id: String,
        name: String,
    },

    #[error("Failed to resolve credential secret: {0}")]
    SecretResolution(String),

    // Config errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a Query error from a backend failure
    pub fn query(backend: &'static str, op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Query {
            backend,
            op,
            message: err.to_string(),
        }
    }

    /// Build a Connection error from a backend failure
    pub fn connection(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            backend,
            message: err.to_string(),
        }
    }

    /// Whether the caller can recover by correcting its input and retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::PlaintextCredential(_)
                | Self::MissingRequiredField(_)
                | Self::Cancelled
        )
    }
}
