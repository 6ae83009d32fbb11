//! Canonical messaging state.
//!
//! [`StoreState`] is plain data. Only [`MessagingStore`](crate::MessagingStore)
//! mutates it; everything else reads it through projections.

use std::collections::{HashMap, HashSet};

use abode_core::{Conversation, ConversationId, CorrelationId, Message};

use crate::errors::MessagingError;
use crate::thread::reconcile_last_message;

/// How much of a thread has been loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Highest page loaded (1-based).
    pub page: u32,
    /// Page size used for the thread.
    pub limit: u32,
    /// Total messages in the thread according to the backend.
    pub total: u32,
    /// Whether an older page exists.
    pub has_more: bool,
}

impl Pagination {
    /// Cursor after loading `page` of size `limit` from a thread of `total`.
    pub fn new(page: u32, limit: u32, total: u32) -> Self {
        Self {
            page,
            limit,
            total,
            has_more: u64::from(page) * u64::from(limit) < u64::from(total),
        }
    }
}

/// Everything the store knows about the current session.
#[derive(Clone, Debug, Default)]
pub struct StoreState {
    /// Loaded conversations, most recently updated first.
    pub conversations: Vec<Conversation>,
    /// The selected conversation.
    pub active_conversation_id: Option<ConversationId>,
    /// Bumped whenever the selection changes to a different conversation.
    pub activation: u64,
    /// Cached threads, each sorted by `(created_at, id)`.
    pub messages: HashMap<ConversationId, Vec<Message>>,
    /// Pagination cursor per cached thread.
    pub message_pagination: HashMap<ConversationId, Pagination>,
    /// A conversation list request is in flight.
    pub is_loading_conversations: bool,
    /// Last conversation list failure.
    pub conversation_error: Option<MessagingError>,
    /// Threads with a page request in flight.
    pub loading_messages: HashSet<ConversationId>,
    /// Last thread fetch failure per conversation, cleared by that
    /// conversation's next successful page.
    pub message_errors: HashMap<ConversationId, MessagingError>,
}

impl StoreState {
    /// Look up a loaded conversation.
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub(crate) fn conversation_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    /// Cached thread of a conversation (empty if never fetched).
    pub fn thread(&self, id: &ConversationId) -> &[Message] {
        self.messages.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Last thread fetch failure for a conversation.
    pub fn message_error(&self, id: &ConversationId) -> Option<&MessagingError> {
        self.message_errors.get(id)
    }

    /// Locate an unconfirmed message by correlation id.
    pub fn find_unconfirmed(&self, correlation_id: &CorrelationId) -> Option<&Message> {
        self.messages.values().flatten().find(|m| {
            !m.delivery.is_confirmed() && m.correlation_id.as_ref() == Some(correlation_id)
        })
    }

    /// Change the selection. Returns whether it changed.
    pub(crate) fn select(&mut self, id: Option<ConversationId>) -> bool {
        if self.active_conversation_id == id {
            return false;
        }
        self.active_conversation_id = id;
        self.activation += 1;
        true
    }

    /// Re-derive a conversation's preview from its cached thread.
    pub(crate) fn refresh_preview(&mut self, id: &ConversationId) {
        let thread = self.messages.get(id).map(Vec::as_slice).unwrap_or_default();
        if let Some(conversation) = self.conversations.iter_mut().find(|c| &c.id == id) {
            let _ = reconcile_last_message(conversation, thread);
        }
    }

    /// Move a conversation to the head of the list.
    pub(crate) fn promote(&mut self, id: &ConversationId) {
        if let Some(pos) = self.conversations.iter().position(|c| &c.id == id) {
            let conversation = self.conversations.remove(pos);
            self.conversations.insert(0, conversation);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
