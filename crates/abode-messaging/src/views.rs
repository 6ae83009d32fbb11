//! Read-only projections over [`StoreState`].
//!
//! These are plain functions of the state and the current user; the facade
//! recomputes them whenever the store version changes.

use abode_core::{Conversation, ConversationId, ConversationStatus, Message, UserId};

use crate::errors::MessagingError;
use crate::state::{Pagination, StoreState};

/// The selected conversation, if it is loaded.
pub fn active_conversation(state: &StoreState) -> Option<&Conversation> {
    state
        .active_conversation_id
        .as_ref()
        .and_then(|id| state.conversation(id))
}

/// Cached thread of the selected conversation.
pub fn active_messages(state: &StoreState) -> &[Message] {
    state
        .active_conversation_id
        .as_ref()
        .map(|id| state.thread(id))
        .unwrap_or_default()
}

/// Pagination cursor of the selected conversation.
pub fn active_pagination(state: &StoreState) -> Option<Pagination> {
    state
        .active_conversation_id
        .as_ref()
        .and_then(|id| state.message_pagination.get(id))
        .copied()
}

/// Whether a page of the selected conversation is being loaded.
pub fn is_loading_active_messages(state: &StoreState) -> bool {
    state
        .active_conversation_id
        .as_ref()
        .is_some_and(|id| state.loading_messages.contains(id))
}

/// Unread messages for `user` across all non-archived conversations.
pub fn total_unread_count(state: &StoreState, user: &UserId) -> u32 {
    state
        .conversations
        .iter()
        .filter(|c| c.status != ConversationStatus::Archived)
        .map(|c| c.unread_for(user))
        .sum()
}

/// Everything the UI renders, computed once per state version.
#[derive(Clone, Debug, Default)]
pub struct MessagingView {
    /// Store version this view was computed from.
    pub version: u64,
    /// Loaded conversations, most recently updated first.
    pub conversations: Vec<Conversation>,
    /// The selected conversation id.
    pub active_conversation_id: Option<ConversationId>,
    /// The selected conversation.
    pub active_conversation: Option<Conversation>,
    /// Its cached thread.
    pub active_messages: Vec<Message>,
    /// Its pagination cursor.
    pub active_pagination: Option<Pagination>,
    /// A conversation list request is in flight.
    pub is_loading_conversations: bool,
    /// Last conversation list failure.
    pub conversation_error: Option<MessagingError>,
    /// A page of the selected thread is in flight.
    pub is_loading_messages: bool,
    /// Last thread fetch failure of the selected conversation.
    pub message_error: Option<MessagingError>,
    /// Unread total across non-archived conversations.
    pub total_unread_count: u32,
}

impl MessagingView {
    /// Project `state` for `user`.
    pub fn project(state: &StoreState, user: &UserId, version: u64) -> Self {
        Self {
            version,
            conversations: state.conversations.clone(),
            active_conversation_id: state.active_conversation_id.clone(),
            active_conversation: active_conversation(state).cloned(),
            active_messages: active_messages(state).to_vec(),
            active_pagination: active_pagination(state),
            is_loading_conversations: state.is_loading_conversations,
            conversation_error: state.conversation_error.clone(),
            is_loading_messages: is_loading_active_messages(state),
            message_error: state
                .active_conversation_id
                .as_ref()
                .and_then(|id| state.message_error(id))
                .cloned(),
            total_unread_count: total_unread_count(state, user),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{conversation, message};

    fn state() -> StoreState {
        let me = UserId::from("me");
        let mut a = conversation("a", &["me", "x"], 0);
        let _ = a.unread_count.insert(me.clone(), 2);
        let mut b = conversation("b", &["me", "y"], 0);
        let _ = b.unread_count.insert(me.clone(), 3);
        let _ = b.unread_count.insert(UserId::from("y"), 7);
        let mut archived = conversation("z", &["me", "z"], 0);
        let _ = archived.unread_count.insert(me, 5);
        archived.status = ConversationStatus::Archived;

        let mut state = StoreState {
            conversations: vec![a, b, archived],
            ..StoreState::default()
        };
        let _ = state
            .messages
            .insert(ConversationId::from("b"), vec![message("m1", "b", "y", 1)]);
        let _ = state
            .message_pagination
            .insert(ConversationId::from("b"), Pagination::new(1, 30, 1));
        state
    }

    #[test]
    fn unread_total_skips_archived_and_other_users() {
        assert_eq!(total_unread_count(&state(), &UserId::from("me")), 5);
        assert_eq!(total_unread_count(&state(), &UserId::from("nobody")), 0);
    }

    #[test]
    fn nothing_active() {
        let state = state();
        assert!(active_conversation(&state).is_none());
        assert!(active_messages(&state).is_empty());
        assert!(active_pagination(&state).is_none());
        assert!(!is_loading_active_messages(&state));
    }

    #[test]
    fn active_projection() {
        let mut state = state();
        state.active_conversation_id = Some(ConversationId::from("b"));
        let _ = state.loading_messages.insert(ConversationId::from("b"));

        let view = MessagingView::project(&state, &UserId::from("me"), 9);
        assert_eq!(view.version, 9);
        assert_eq!(view.active_conversation.unwrap().id.as_str(), "b");
        assert_eq!(view.active_messages.len(), 1);
        assert_eq!(view.active_pagination, Some(Pagination::new(1, 30, 1)));
        assert!(view.is_loading_messages);
        assert_eq!(view.total_unread_count, 5);
    }

    #[test]
    fn active_id_without_loaded_conversation() {
        let mut state = state();
        state.active_conversation_id = Some(ConversationId::from("gone"));
        assert!(active_conversation(&state).is_none());
        assert!(active_messages(&state).is_empty());
    }
}
