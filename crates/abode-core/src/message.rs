//! Messages and their thread ordering.
//!
//! Messages are append-only. The only mutation after creation is a soft
//! delete, which keeps the record (and its position in the thread) but swaps
//! the content for a tombstone. Within a conversation, messages are totally
//! ordered by `(created_at, id)`; see [`order_cmp`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, CorrelationId, MessageId, UserId};

/// Kind of payload a message carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment(s), optional caption.
    Image,
    /// Document attachment(s), optional caption.
    Document,
    /// Viewing appointment proposal.
    Appointment,
    /// System-generated notice.
    System,
}

impl MessageType {
    /// All variants, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Text,
        Self::Image,
        Self::Document,
        Self::Appointment,
        Self::System,
    ];

    /// Wire name (`"text"`, `"image"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Appointment => "appointment",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {s}"))
    }
}

/// Descriptor of a file attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Where the file can be fetched from.
    pub url: String,
    /// Display name.
    pub name: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Local delivery state of a message.
///
/// Only messages the current client sent are ever anything but `Confirmed`;
/// the backend never sees this field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DeliveryState {
    /// Acknowledged by the backend.
    #[default]
    Confirmed,
    /// Appended optimistically, awaiting acknowledgment.
    Pending,
    /// The backend rejected the write; kept so the user can retry.
    Failed {
        /// Why the send failed.
        error: String,
    },
}

impl DeliveryState {
    /// Whether the backend has acknowledged the message.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// A single message in a conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message id.
    pub id: MessageId,
    /// Owning conversation (fixed at creation).
    pub conversation_id: ConversationId,
    /// Author; always one of the conversation's participants.
    pub sender_id: UserId,
    /// Text payload (tombstone text once deleted).
    pub content: String,
    /// Payload kind.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Ordered attachment descriptors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Participant → time they first read the message.
    #[serde(default)]
    pub read_by: BTreeMap<UserId, DateTime<Utc>>,
    /// Creation time; defines thread order.
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Client correlation id, set on messages this client sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Local delivery state.
    #[serde(default, skip_serializing_if = "DeliveryState::is_confirmed")]
    pub delivery: DeliveryState,
}

impl Message {
    /// Whether `user` has a read receipt on this message.
    #[must_use]
    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.contains_key(user)
    }

    /// Whether this is an unacknowledged optimistic entry.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, DeliveryState::Pending)
    }

    /// Whether the backend rejected this entry.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, DeliveryState::Failed { .. })
    }
}

/// Thread order: `created_at` ascending, ties broken by `id`.
pub fn order_cmp(a: &Message, b: &Message) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
