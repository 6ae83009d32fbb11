//! The repository contract consumed by the messaging store.
//!
//! [`ConversationRepository`] is pure data access: it persists and queries
//! conversations and messages and applies no client-side policy. The store
//! owns ordering, optimistic writes and unread bookkeeping; implementations
//! only need to honour the per-method contracts documented here.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, ConversationStatus};
use crate::errors::Result;
use crate::ids::{ConversationId, CorrelationId, MessageId, PropertyId, UserId};
use crate::message::{Attachment, Message, MessageType};

/// Filters for listing conversations.
///
/// With `status` unset, archived conversations are excluded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationFilters {
    /// Only conversations about this listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<PropertyId>,
    /// Only conversations this user takes part in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<UserId>,
    /// Only conversations with exactly this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
}

/// One page of a conversation's history.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagePage {
    /// Page contents, oldest first.
    pub messages: Vec<Message>,
    /// Total number of messages in the conversation.
    pub total: u32,
}

/// A message to persist.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    pub message_type: MessageType,
    /// Attachment descriptors.
    pub attachments: Vec<Attachment>,
    /// Client-generated creation time.
    pub created_at: DateTime<Utc>,
    /// Echoed back on the stored message.
    pub correlation_id: Option<CorrelationId>,
}

/// Content of the first message of a new conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialMessage {
    /// Text payload.
    pub content: String,
    /// Payload kind.
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Attachment descriptors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// A conversation to create together with its first message.
#[derive(Clone, Debug, PartialEq)]
pub struct NewConversation {
    /// Creator; also the sender of the initial message.
    pub creator_id: UserId,
    /// Full participant set, creator included.
    pub participant_ids: BTreeSet<UserId>,
    /// Listing the conversation is about.
    pub property_id: Option<PropertyId>,
    /// First message.
    pub initial_message: InitialMessage,
    /// Client-generated creation time.
    pub created_at: DateTime<Utc>,
}

/// Filters for searching within one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Case-insensitive substring of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Allowed message types; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_types: Vec<MessageType>,
}

/// Backend seam for conversation and message persistence.
///
/// Every method is independently awaitable; the store may have several calls
/// in flight at once for different conversations.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// List conversations matching `filters`, most recently updated first.
    async fn list_conversations(&self, filters: &ConversationFilters) -> Result<Vec<Conversation>>;

    /// Fetch one page of history.
    ///
    /// Page 1 holds the newest `limit` messages, page 2 the `limit` before
    /// those, and so on. Each page is ordered oldest first.
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage>;

    /// Persist a message and return the stored record.
    async fn create_message(&self, message: &NewMessage) -> Result<Message>;

    /// Atomically create a conversation and its first message.
    ///
    /// The returned conversation's `last_message` is that first message.
    async fn create_conversation(&self, conversation: &NewConversation) -> Result<Conversation>;

    /// Record that `participant_id` has read everything in the conversation.
    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        participant_id: &UserId,
    ) -> Result<()>;

    /// Flag a message as deleted without removing it.
    async fn soft_delete_message(&self, message_id: &MessageId) -> Result<()>;

    /// Change a conversation's status.
    async fn set_conversation_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<()>;

    /// Search a conversation's non-deleted messages, oldest first.
    async fn search_messages(
        &self,
        conversation_id: &ConversationId,
        filters: &SearchFilters,
    ) -> Result<Vec<Message>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
