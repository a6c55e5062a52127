//! Error types for the cookbook version store.
//!
//! Absence ([`StoreError::CookbookNotFound`], [`StoreError::VersionNotFound`])
//! is an expected outcome, not a program error. Uniqueness violations from
//! SQLite surface as [`StoreError::ConcurrentConflict`] so callers can retry;
//! every other driver failure is a [`StoreError::BackendFailure`].

use cookbook_store_core::{Segment, VersionError};
use cookbook_store_db::DatabaseError;
use rusqlite::ffi;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur during cookbook store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No cookbook row with this name.
    #[error("cookbook not found: {0}")]
    CookbookNotFound(String),

    /// No version row for this cookbook and version triple.
    #[error("cookbook version not found: {cookbook} {version}")]
    VersionNotFound { cookbook: String, version: String },

    /// Malformed version string.
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    /// A sub-document could not be encoded; nothing was written.
    #[error("failed to encode {segment}: {source}")]
    EncodeFailure {
        segment: Segment,
        #[source]
        source: CodecError,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record {record}: {reason}")]
    DecodeFailure { record: String, reason: String },

    /// A uniqueness constraint rejected the write; another caller won a race.
    #[error("concurrent conflict: {0}")]
    ConcurrentConflict(#[source] rusqlite::Error),

    /// Any other SQLite failure.
    #[error("{context}: {source}")]
    BackendFailure {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The operation failed and rolling back its transaction failed too.
    #[error("{cause}; rolling back the transaction also failed: {rollback}")]
    RollbackFailed {
        cause: Box<StoreError>,
        rollback: rusqlite::Error,
    },

    /// The configured save policy refused the write.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Table prefix contains invalid characters.
    #[error("invalid prefix '{0}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix(String),

    /// Migration lifecycle operation failure.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// Error loading cookbook version documents.
    #[error("loader error: {0}")]
    LoaderError(#[from] DatabaseError),
}

impl StoreError {
    /// Returns `true` for the absence outcomes.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::CookbookNotFound(_) | StoreError::VersionNotFound { .. } => true,
            StoreError::RollbackFailed { cause, .. } => cause.is_not_found(),
            _ => false,
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::ConcurrentConflict(_) => true,
            StoreError::RollbackFailed { cause, .. } => cause.is_conflict(),
            _ => false,
        }
    }

    /// Returns a mapper that tags a SQLite error with what was being done.
    pub(crate) fn backend(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| {
            if is_unique_violation(&source) {
                StoreError::ConcurrentConflict(source)
            } else {
                StoreError::BackendFailure {
                    context: context.to_string(),
                    source,
                }
            }
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::backend("database error")(err)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(extended_code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(extended_code), Some("constraint failed".into()))
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err: StoreError = sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE).into();
        assert!(err.is_conflict());
        let err: StoreError = sqlite_failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY).into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_other_constraints_are_backend_failures() {
        let err = StoreError::backend("delete cookbook")(sqlite_failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY));
        assert!(!err.is_conflict());
        assert!(err.to_string().starts_with("delete cookbook: "));
    }

    #[test]
    fn test_rollback_failure_names_both_errors() {
        let err = StoreError::RollbackFailed {
            cause: Box::new(StoreError::CookbookNotFound("nginx".into())),
            rollback: rusqlite::Error::InvalidQuery,
        };
        let message = err.to_string();
        assert!(message.contains("cookbook not found: nginx"), "{message}");
        assert!(message.contains("rolling back the transaction also failed"), "{message}");
        assert!(err.is_not_found());
    }
}
