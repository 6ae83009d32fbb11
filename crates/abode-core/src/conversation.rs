//! Conversations between a fixed set of participants.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, PropertyId, UserId};
use crate::message::Message;

/// Lifecycle status of a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Shown in the inbox, accepts messages.
    #[default]
    Active,
    /// Kept in history, hidden from the default inbox.
    Archived,
    /// Accepts no new messages.
    Blocked,
}

impl ConversationStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

/// A thread of messages between two or more participants.
///
/// `last_message` is a denormalized copy of the newest message, kept for
/// inbox previews; `unread_count` keys are always participants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation id.
    pub id: ConversationId,
    /// Participants (at least two, immutable after creation).
    pub participants: BTreeSet<UserId>,
    /// Listing this conversation is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<PropertyId>,
    /// Newest message in the thread.
    #[serde(default)]
    pub last_message: Option<Message>,
    /// Participant → number of messages they have not read.
    #[serde(default)]
    pub unread_count: BTreeMap<UserId, u32>,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Advances on every new message or status change.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Unread messages for `user` (0 when the user has no entry).
    #[must_use]
    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread_count.get(user).copied().unwrap_or(0)
    }

    /// Whether `user` takes part in this conversation.
    #[must_use]
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// Blocked conversations accept no new messages.
    #[must_use]
    pub fn accepts_messages(&self) -> bool {
        self.status != ConversationStatus::Blocked
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
