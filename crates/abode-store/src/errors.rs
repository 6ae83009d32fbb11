//! Error types for the `SQLite` backend.
//!
//! [`StoreError`] is returned by every repository method. At the repository
//! seam it is converted into [`RepositoryError`], which is all the messaging
//! store ever sees.

use abode_core::RepositoryError;
use thiserror::Error;

/// Errors that can occur during `SQLite` store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON column could not be (de)serialized.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A stored value could not be mapped back to a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Requested conversation was not found.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// Requested message was not found.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// The request violates a conversation rule.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => Self::conversation_not_found(id),
            StoreError::MessageNotFound(id) => Self::message_not_found(id),
            StoreError::InvalidOperation(msg) => Self::Rejected(msg),
            StoreError::Pool(e) => Self::Unavailable(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn migration_error_display() {
        let err = StoreError::Migration {
            message: "v001 failed: table already exists".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration error: v001 failed: table already exists"
        );
    }

    #[test]
    fn not_found_maps_to_repository_not_found() {
        let err: RepositoryError = StoreError::ConversationNotFound("c1".into()).into();
        assert_eq!(err, RepositoryError::conversation_not_found("c1"));
        let err: RepositoryError = StoreError::MessageNotFound("m1".into()).into();
        assert_eq!(err, RepositoryError::message_not_found("m1"));
    }

    #[test]
    fn invalid_operation_maps_to_rejected() {
        let err: RepositoryError =
            StoreError::InvalidOperation("conversation is blocked".into()).into();
        assert_matches!(err, RepositoryError::Rejected(msg) if msg == "conversation is blocked");
    }

    #[test]
    fn sqlite_maps_to_internal() {
        let err: RepositoryError = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows).into();
        assert_matches!(err, RepositoryError::Internal(_));
    }
}
