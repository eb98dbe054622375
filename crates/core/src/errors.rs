//! Error types for the LdapGroups core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Entry(#[from] EntryError),
}

// ---------------------------------------------------------------------------
// Mapping errors
// ---------------------------------------------------------------------------

/// Errors raised while evaluating mapping rules against a directory entry.
///
/// An absent attribute is not an error: it is a non-match.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A rule names an operator that is not in the registry.
    #[error("unknown operator '{operator}' in mapping rule for attribute '{attribute}'")]
    UnknownOperator {
        operator: String,
        attribute: String,
    },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors from a user group store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite-backed store failed.
    #[error("group store database error: {0}")]
    Database(#[from] DatabaseError),

    /// Any other host store backend failure.
    #[error("group store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the login group synchronization step.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No directory server with this name is configured.
    #[error("no directory server named '{0}' is configured")]
    UnknownServer(String),

    /// Rule evaluation failed; no group was changed.
    #[error("group mapping failed: {0}")]
    Mapping(#[from] MappingError),

    /// The host store rejected a group change.
    #[error("group sync store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DatabaseError> for SyncError {
    fn from(err: DatabaseError) -> Self {
        SyncError::Store(StoreError::Database(err))
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Directory entry errors
// ---------------------------------------------------------------------------

/// Errors loading a serialized directory entry.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The JSON document is not a valid directory entry.
    #[error("directory entry parse error: {0}")]
    ParseError(String),

    /// Generic I/O error reading the entry file.
    #[error("directory entry I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
