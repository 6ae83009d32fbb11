//! Error type for the repository seam.
//!
//! [`RepositoryError`] is the only error a [`ConversationRepository`]
//! implementation may return. It is `Clone` so the store can keep the last
//! failure in its error fields.
//!
//! [`ConversationRepository`]: crate::repository::ConversationRepository

use thiserror::Error;

/// Errors returned by a conversation backend.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend could not be reached or timed out.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (`"conversation"`, `"message"`).
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The backend refused the request (validation, permissions).
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// Any other backend failure.
    #[error("internal backend error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Shorthand for a missing conversation.
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "conversation",
            id: id.into(),
        }
    }

    /// Shorthand for a missing message.
    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "message",
            id: id.into(),
        }
    }
}

/// Convenience type alias for repository results.
pub type Result<T> = std::result::Result<T, RepositoryError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
