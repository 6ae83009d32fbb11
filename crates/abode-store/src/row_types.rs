//! Database row types and their mapping to domain types.
//!
//! Rows mirror the table shape with timestamps and enums kept as text.
//! Conversion into [`Conversation`]/[`Message`] happens here so that the
//! repositories only deal with SQL.

use std::collections::BTreeMap;

use abode_core::{
    Attachment, Conversation, ConversationId, ConversationStatus, DeliveryState, Message,
    MessageId, MessageType, UserId,
};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::{Result, StoreError};

/// Format a timestamp for storage (fixed-width, sortable as text).
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

/// Raw row from the `conversations` table.
#[derive(Clone, Debug)]
pub struct ConversationRow {
    /// Conversation ID.
    pub id: String,
    /// Listing the conversation is about.
    pub property_id: Option<String>,
    /// Status name.
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Raw row from `conversation_participants`.
#[derive(Clone, Debug)]
pub struct ParticipantRow {
    /// Participant user ID.
    pub user_id: String,
    /// Messages this participant has not read.
    pub unread_count: u32,
}

/// Raw row from the `messages` table.
#[derive(Clone, Debug)]
pub struct MessageRow {
    /// Message ID.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author.
    pub sender_id: String,
    /// Stored content.
    pub content: String,
    /// Message type name.
    pub message_type: String,
    /// Attachments as a JSON array.
    pub attachments: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Client correlation id.
    pub correlation_id: Option<String>,
}

impl MessageRow {
    /// Map a `SELECT * FROM messages` row.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            sender_id: row.get("sender_id")?,
            content: row.get("content")?,
            message_type: row.get("type")?,
            attachments: row.get("attachments")?,
            created_at: row.get("created_at")?,
            is_deleted: row.get("is_deleted")?,
            correlation_id: row.get("correlation_id")?,
        })
    }

    /// Convert into a domain message with the given read receipts.
    pub fn into_message(self, read_by: BTreeMap<UserId, DateTime<Utc>>) -> Result<Message> {
        let message_type: MessageType = self.message_type.parse().map_err(StoreError::Corrupt)?;
        let attachments: Vec<Attachment> = serde_json::from_str(&self.attachments)?;
        Ok(Message {
            id: MessageId::from(self.id),
            conversation_id: ConversationId::from(self.conversation_id),
            sender_id: UserId::from(self.sender_id),
            content: self.content,
            message_type,
            attachments,
            read_by,
            created_at: parse_ts(&self.created_at)?,
            is_deleted: self.is_deleted,
            correlation_id: self.correlation_id.map(Into::into),
            delivery: DeliveryState::Confirmed,
        })
    }
}

impl ConversationRow {
    /// Map a `SELECT * FROM conversations` row.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            property_id: row.get("property_id")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Assemble a domain conversation from its parts.
    pub fn into_conversation(
        self,
        participants: Vec<ParticipantRow>,
        last_message: Option<Message>,
    ) -> Result<Conversation> {
        let status: ConversationStatus = self.status.parse().map_err(StoreError::Corrupt)?;
        let mut unread_count = BTreeMap::new();
        let mut members = std::collections::BTreeSet::new();
        for p in participants {
            let user = UserId::from(p.user_id);
            if p.unread_count > 0 {
                let _ = unread_count.insert(user.clone(), p.unread_count);
            }
            let _ = members.insert(user);
        }
        Ok(Conversation {
            id: ConversationId::from(self.id),
            participants: members,
            property_id: self.property_id.map(Into::into),
            last_message,
            unread_count,
            status,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
