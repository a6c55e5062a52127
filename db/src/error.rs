//! Error types for settings and document loading.
//!
//! Provides a unified error type covering I/O, serialization, malformed
//! cookbook version documents and invalid settings values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving settings or loading documents.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A file could not be parsed as a cookbook version document or bundle.
    #[error("invalid document {}: {reason}", path.display())]
    InvalidDocument { path: PathBuf, reason: String },

    /// A settings value from the file, environment or command line is
    /// unusable.
    #[error("invalid setting {key}={value:?}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    /// No document sources were given.
    #[error("no document sources available")]
    NoSourcesAvailable,
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
