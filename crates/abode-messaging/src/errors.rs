//! Messaging error taxonomy.
//!
//! Fetch failures are captured into the store's error fields; every other
//! variant is returned to the caller of the failing action. None of them is
//! fatal, and all are `Clone` so the store can keep them in its state.

use std::fmt;

use abode_core::{ConversationId, CorrelationId, MessageId, RepositoryError};
use thiserror::Error;

/// What a failed fetch was loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchScope {
    /// The conversation list.
    Conversations,
    /// A page of a thread.
    Messages,
    /// A message search.
    Search,
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conversations => "conversations",
            Self::Messages => "messages",
            Self::Search => "search results",
        })
    }
}

/// Errors surfaced by the messaging store and facade.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// Loading conversations, messages or search results failed.
    #[error("failed to fetch {scope}: {source}")]
    FetchFailure {
        /// What was being fetched.
        scope: FetchScope,
        /// Backend failure.
        source: RepositoryError,
    },

    /// The backend did not accept a sent message.
    #[error("failed to send message: {0}")]
    SendFailure(#[source] RepositoryError),

    /// The backend did not create the conversation.
    #[error("failed to create conversation: {0}")]
    CreateConversationFailure(#[source] RepositoryError),

    /// The backend did not delete the message.
    #[error("failed to delete message: {0}")]
    DeleteFailure(#[source] RepositoryError),

    /// The backend did not record the read receipt.
    #[error("failed to mark conversation read: {0}")]
    MarkReadFailure(#[source] RepositoryError),

    /// The backend did not change the conversation status.
    #[error("failed to change conversation status: {0}")]
    StatusChangeFailure(#[source] RepositoryError),

    /// The request was rejected before reaching the backend.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The conversation is not loaded in the store.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// The message is not loaded in the store.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// The conversation is blocked and accepts no new messages.
    #[error("conversation is blocked: {0}")]
    ConversationBlocked(ConversationId),

    /// No failed send carries this correlation id.
    #[error("no failed message with correlation id {0}")]
    PendingMessageNotFound(CorrelationId),
}

impl MessagingError {
    /// The backend error behind this failure, if any.
    pub fn repository_error(&self) -> Option<&RepositoryError> {
        match self {
            Self::FetchFailure { source, .. }
            | Self::SendFailure(source)
            | Self::CreateConversationFailure(source)
            | Self::DeleteFailure(source)
            | Self::MarkReadFailure(source)
            | Self::StatusChangeFailure(source) => Some(source),
            Self::InvalidInput(_)
            | Self::ConversationNotFound(_)
            | Self::MessageNotFound(_)
            | Self::ConversationBlocked(_)
            | Self::PendingMessageNotFound(_) => None,
        }
    }

    /// Whether the same request might succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.repository_error(),
            Some(RepositoryError::Unavailable(_) | RepositoryError::Internal(_))
        )
    }
}

/// Convenience type alias for messaging results.
pub type Result<T> = std::result::Result<T, MessagingError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
