//! Core error types for focustally-core.
//!
//! Every fallible operation in the library returns [`CoreError`] or one of
//! its component errors. The public engine entry points never surface these
//! to callers; they are logged and reported instead.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focustally-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Mask/unmask errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend could not be reached or failed mid-operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// `update` targeted a document that does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Write could not be applied to the document
    #[error("Write rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// Stored document is not a JSON object
    #[error("Corrupt document at {path}: {message}")]
    Corrupt { path: String, message: String },

    /// Failed to open the SQLite database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Mask/unmask errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Masked value is not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Unmasked bytes are not valid UTF-8
    #[error("unmasked bytes are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Unmasked text is not a duration
    #[error("unmasked value {0:?} is not a duration")]
    NotADuration(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Key does not exist in the configuration
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Document path segment is empty or contains a separator
    #[error("Invalid path segment {segment:?}: {message}")]
    InvalidPathSegment { segment: String, message: String },

    /// Field path is empty or has an empty component
    #[error("Invalid field path {0:?}")]
    InvalidFieldPath(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg)
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                StoreError::Locked
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_into_core_error() {
        let err: CoreError = StoreError::NotFound("users/u/topics/t".into()).into();
        assert_eq!(
            err.to_string(),
            "Store error: Document not found: users/u/topics/t"
        );
    }

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let sqlite = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(StoreError::from(sqlite), StoreError::Locked));
    }
}
