//! Messaging State Store.
//!
//! [`MessagingStore`] is the single owner of conversation and message state
//! for one signed-in user. Every mutation goes through one of its methods,
//! which update [`StoreState`] under a write lock and then bump the state
//! version published on a [`watch`] channel.
//!
//! The lock is never held across an `await`: each operation reads what it
//! needs, awaits the repository, and applies a patch keyed by conversation
//! or message id. Out-of-order completions therefore only touch their own
//! entries.
//!
//! ## Failure policy
//!
//! - Fetch failures land in `conversation_error` / `message_errors` and keep
//!   the previously loaded data.
//! - Send, create, delete, mark-read and status changes return an error to
//!   the caller.
//! - A failed send keeps its optimistic entry, flagged
//!   [`DeliveryState::Failed`], until [`MessagingStore::retry_send`] or
//!   [`MessagingStore::discard_failed`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use abode_core::{
    Conversation, ConversationFilters, ConversationId, ConversationRepository, ConversationStatus,
    CorrelationId, DeliveryState, Message, MessageId, MessagePage, NewConversation, NewMessage,
    SearchFilters, UserId,
};
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MessagingConfig;
use crate::draft::{ConversationDraft, MessageDraft};
use crate::errors::{FetchScope, MessagingError, Result};
use crate::state::{Pagination, StoreState};
use crate::thread::{confirm_pending, merge_messages};

/// Process-wide messaging state for one user.
pub struct MessagingStore {
    repository: Arc<dyn ConversationRepository>,
    current_user: UserId,
    config: MessagingConfig,
    state: RwLock<StoreState>,
    version: watch::Sender<u64>,
    conversations_generation: AtomicU64,
}

impl MessagingStore {
    /// Create an empty store acting on behalf of `current_user`.
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        current_user: UserId,
        config: MessagingConfig,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            repository,
            current_user,
            config,
            state: RwLock::new(StoreState::default()),
            version,
            conversations_generation: AtomicU64::new(0),
        }
    }

    /// The signed-in user.
    pub fn current_user(&self) -> &UserId {
        &self.current_user
    }

    /// Store configuration.
    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Current state version; increases after every mutation.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Receive a notification after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.state.read())
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }

    /// Filters for the current user's inbox.
    pub fn inbox_filters(&self) -> ConversationFilters {
        ConversationFilters {
            participant_id: Some(self.current_user.clone()),
            ..ConversationFilters::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Fetching
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the conversation list.
    ///
    /// `None` loads the current user's inbox. A response that arrives after a
    /// newer call has started is dropped.
    pub async fn fetch_conversations(&self, filters: Option<ConversationFilters>) {
        let filters = filters.unwrap_or_else(|| self.inbox_filters());
        let generation = self.conversations_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.mutate(|s| s.is_loading_conversations = true);
        debug!(generation, "fetching conversations");

        let result = self.repository.list_conversations(&filters).await;
        if self.conversations_generation.load(Ordering::SeqCst) != generation {
            warn!(generation, "dropping superseded conversation list");
            return;
        }

        match result {
            Ok(list) => {
                let list: Vec<Conversation> = list
                    .into_iter()
                    .map(|c| self.normalize_conversation(c))
                    .collect();
                let count = list.len();
                self.mutate(|s| {
                    let ids: Vec<ConversationId> = list.iter().map(|c| c.id.clone()).collect();
                    s.conversations = list;
                    for id in &ids {
                        s.refresh_preview(id);
                    }
                    if let Some(active) = s.active_conversation_id.clone() {
                        if s.conversation(&active).is_none() {
                            let _ = s.select(None);
                        }
                    }
                    s.is_loading_conversations = false;
                    s.conversation_error = None;
                });
                debug!(count, "conversations loaded");
            }
            Err(e) => {
                warn!(error = %e, "conversation fetch failed, keeping previous list");
                self.mutate(|s| {
                    s.is_loading_conversations = false;
                    s.conversation_error = Some(MessagingError::FetchFailure {
                        scope: FetchScope::Conversations,
                        source: e,
                    });
                });
            }
        }
    }

    /// Load one page of a thread and merge it into the cache.
    pub async fn fetch_messages(&self, conversation_id: &ConversationId, page: u32, limit: u32) {
        if page == 0 || limit == 0 {
            self.mutate(|s| {
                let _ = s.message_errors.insert(
                    conversation_id.clone(),
                    MessagingError::InvalidInput(format!("invalid page {page} with limit {limit}")),
                );
            });
            return;
        }
        self.mutate(|s| {
            let _ = s.loading_messages.insert(conversation_id.clone());
        });

        match self
            .repository
            .list_messages(conversation_id, page, limit)
            .await
        {
            Ok(MessagePage { messages, total }) => {
                let incoming: Vec<Message> =
                    messages.into_iter().map(|m| self.normalize(m)).collect();
                let received = incoming.len();
                self.mutate(|s| {
                    let cached = s.messages.remove(conversation_id).unwrap_or_default();
                    let _ = s
                        .messages
                        .insert(conversation_id.clone(), merge_messages(cached, incoming));
                    s.refresh_preview(conversation_id);

                    // Pages may resolve in any order; keep the deepest cursor.
                    let cursor = match s.message_pagination.get(conversation_id) {
                        Some(prev) if prev.limit == limit && prev.page > page => {
                            Pagination::new(prev.page, limit, total)
                        }
                        _ => Pagination::new(page, limit, total),
                    };
                    let _ = s.message_pagination.insert(conversation_id.clone(), cursor);
                    let _ = s.loading_messages.remove(conversation_id);
                    let _ = s.message_errors.remove(conversation_id);
                });
                debug!(conversation_id = %conversation_id, page, received, total, "messages loaded");
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, page, error = %e, "message fetch failed");
                self.mutate(|s| {
                    let _ = s.loading_messages.remove(conversation_id);
                    let _ = s.message_errors.insert(
                        conversation_id.clone(),
                        MessagingError::FetchFailure {
                            scope: FetchScope::Messages,
                            source: e,
                        },
                    );
                });
            }
        }
    }

    /// Search a thread on the backend without touching the cache.
    pub async fn search_messages(
        &self,
        conversation_id: &ConversationId,
        filters: &SearchFilters,
    ) -> Result<Vec<Message>> {
        let found = self
            .repository
            .search_messages(conversation_id, filters)
            .await
            .map_err(|e| {
                warn!(conversation_id = %conversation_id, error = %e, "search failed");
                MessagingError::FetchFailure {
                    scope: FetchScope::Search,
                    source: e,
                }
            })?;
        debug!(conversation_id = %conversation_id, hits = found.len(), "search complete");
        Ok(found.into_iter().map(|m| self.normalize(m)).collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────

    /// Send a message, appending it optimistically first.
    ///
    /// On failure the optimistic entry stays in the thread flagged as failed.
    pub async fn send_message(&self, draft: MessageDraft) -> Result<Message> {
        draft.validate()?;
        let conversation_id = draft.conversation_id.clone();
        self.ensure_accepts_messages(&conversation_id)?;

        let correlation_id = CorrelationId::new();
        let now = Utc::now();
        let optimistic = Message {
            id: MessageId::pending(&correlation_id),
            conversation_id: conversation_id.clone(),
            sender_id: self.current_user.clone(),
            content: draft.content.clone(),
            message_type: draft.message_type,
            attachments: draft.attachments.clone(),
            read_by: BTreeMap::from([(self.current_user.clone(), now)]),
            created_at: now,
            is_deleted: false,
            correlation_id: Some(correlation_id.clone()),
            delivery: DeliveryState::Pending,
        };
        self.mutate(|s| {
            let mut cached = s.messages.remove(&conversation_id).unwrap_or_default();
            if cached.is_empty() {
                // keep the known preview so a discarded send can fall back to it
                cached.extend(
                    s.conversation(&conversation_id)
                        .and_then(|c| c.last_message.clone())
                        .filter(|m| m.delivery.is_confirmed()),
                );
            }
            let _ = s
                .messages
                .insert(conversation_id.clone(), merge_messages(cached, vec![optimistic]));
            s.refresh_preview(&conversation_id);
            if let Some(c) = s.conversation_mut(&conversation_id) {
                c.updated_at = c.updated_at.max(now);
            }
            s.promote(&conversation_id);
        });
        debug!(
            conversation_id = %conversation_id,
            correlation_id = %correlation_id,
            "optimistic message appended"
        );

        let new = NewMessage {
            conversation_id,
            sender_id: self.current_user.clone(),
            content: draft.content,
            message_type: draft.message_type,
            attachments: draft.attachments,
            created_at: now,
            correlation_id: Some(correlation_id.clone()),
        };
        self.submit(correlation_id, new).await
    }

    /// Re-submit a failed message under its original correlation id.
    pub async fn retry_send(&self, correlation_id: &CorrelationId) -> Result<Message> {
        let failed = self
            .read(|s| s.find_unconfirmed(correlation_id).filter(|m| m.is_failed()).cloned())
            .ok_or_else(|| MessagingError::PendingMessageNotFound(correlation_id.clone()))?;
        self.ensure_accepts_messages(&failed.conversation_id)?;

        self.mutate(|s| {
            if let Some(thread) = s.messages.get_mut(&failed.conversation_id) {
                if let Some(m) = thread.iter_mut().find(|m| m.id == failed.id) {
                    m.delivery = DeliveryState::Pending;
                }
            }
            s.refresh_preview(&failed.conversation_id);
        });
        debug!(correlation_id = %correlation_id, "retrying failed message");

        let new = NewMessage {
            conversation_id: failed.conversation_id,
            sender_id: self.current_user.clone(),
            content: failed.content,
            message_type: failed.message_type,
            attachments: failed.attachments,
            created_at: failed.created_at,
            correlation_id: Some(correlation_id.clone()),
        };
        self.submit(correlation_id.clone(), new).await
    }

    /// Drop a failed message the user gave up on.
    pub fn discard_failed(&self, correlation_id: &CorrelationId) -> Result<()> {
        let conversation_id = self
            .read(|s| {
                s.find_unconfirmed(correlation_id)
                    .filter(|m| m.is_failed())
                    .map(|m| m.conversation_id.clone())
            })
            .ok_or_else(|| MessagingError::PendingMessageNotFound(correlation_id.clone()))?;

        self.mutate(|s| {
            if let Some(thread) = s.messages.get_mut(&conversation_id) {
                thread.retain(|m| {
                    !(m.is_failed() && m.correlation_id.as_ref() == Some(correlation_id))
                });
            }
            s.refresh_preview(&conversation_id);
        });
        info!(conversation_id = %conversation_id, correlation_id = %correlation_id, "failed message discarded");
        Ok(())
    }

    async fn submit(&self, correlation_id: CorrelationId, new: NewMessage) -> Result<Message> {
        let conversation_id = new.conversation_id.clone();
        match self.repository.create_message(&new).await {
            Ok(stored) => {
                let mut stored = self.normalize(stored);
                let _ = stored
                    .read_by
                    .entry(stored.sender_id.clone())
                    .or_insert(stored.created_at);
                if stored.correlation_id.is_none() {
                    stored.correlation_id = Some(correlation_id.clone());
                }

                self.mutate(|s| {
                    let thread = s.messages.entry(conversation_id.clone()).or_default();
                    confirm_pending(thread, &correlation_id, stored.clone());
                    if let Some(c) = s.conversation_mut(&conversation_id) {
                        for participant in &c.participants {
                            if *participant != stored.sender_id {
                                *c.unread_count.entry(participant.clone()).or_insert(0) += 1;
                            }
                        }
                        c.updated_at = c.updated_at.max(stored.created_at);
                    }
                    s.refresh_preview(&conversation_id);
                    s.promote(&conversation_id);
                });
                info!(
                    conversation_id = %conversation_id,
                    message_id = %stored.id,
                    "message sent"
                );
                Ok(stored)
            }
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    correlation_id = %correlation_id,
                    error = %e,
                    "send failed, keeping message for retry"
                );
                let reason = e.to_string();
                self.mutate(|s| {
                    if let Some(thread) = s.messages.get_mut(&conversation_id) {
                        if let Some(m) = thread.iter_mut().find(|m| {
                            !m.delivery.is_confirmed()
                                && m.correlation_id.as_ref() == Some(&correlation_id)
                        }) {
                            m.delivery = DeliveryState::Failed { error: reason };
                        }
                    }
                    s.refresh_preview(&conversation_id);
                });
                Err(MessagingError::SendFailure(e))
            }
        }
    }

    fn ensure_accepts_messages(&self, conversation_id: &ConversationId) -> Result<()> {
        self.read(|s| match s.conversation(conversation_id) {
            None => Err(MessagingError::ConversationNotFound(conversation_id.clone())),
            Some(c) if !c.accepts_messages() => {
                Err(MessagingError::ConversationBlocked(conversation_id.clone()))
            }
            Some(_) => Ok(()),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────

    /// Create a conversation with its first message.
    pub async fn create_conversation(&self, draft: ConversationDraft) -> Result<Conversation> {
        draft.validate(&self.current_user)?;
        let new = NewConversation {
            creator_id: self.current_user.clone(),
            participant_ids: draft.participants_with(&self.current_user),
            property_id: draft.property_id,
            initial_message: draft.initial_message,
            created_at: Utc::now(),
        };

        let created = self
            .repository
            .create_conversation(&new)
            .await
            .map_err(|e| {
                warn!(error = %e, "conversation creation failed");
                MessagingError::CreateConversationFailure(e)
            })?;
        let created = self.normalize_conversation(created);
        let id = created.id.clone();
        let activate = self.config.auto_activate_created;
        let page_size = self.config.page_size;

        self.mutate(|s| {
            s.conversations.retain(|c| c.id != id);
            s.conversations.insert(0, created.clone());
            if let Some(first) = created.last_message.clone() {
                let _ = s.messages.insert(id.clone(), vec![first]);
                let _ = s
                    .message_pagination
                    .insert(id.clone(), Pagination::new(1, page_size, 1));
            }
            if activate {
                let _ = s.select(Some(id.clone()));
            }
        });
        info!(
            conversation_id = %id,
            participants = created.participants.len(),
            "conversation created"
        );
        Ok(created)
    }

    /// Activate an existing conversation with the same participants and
    /// listing, or create one.
    pub async fn open_conversation(&self, draft: ConversationDraft) -> Result<Conversation> {
        draft.validate(&self.current_user)?;
        let participants = draft.participants_with(&self.current_user);
        let existing = self.read(|s| {
            s.conversations
                .iter()
                .find(|c| {
                    c.participants == participants
                        && c.property_id == draft.property_id
                        && c.status != ConversationStatus::Blocked
                })
                .cloned()
        });
        if let Some(conversation) = existing {
            debug!(conversation_id = %conversation.id, "reusing existing conversation");
            let _ = self.set_active_conversation(Some(conversation.id.clone()));
            return Ok(conversation);
        }
        self.create_conversation(draft).await
    }

    /// Select a conversation (or none). Returns whether the selection changed.
    pub fn set_active_conversation(&self, id: Option<ConversationId>) -> bool {
        if self.read(|s| s.active_conversation_id == id) {
            return false;
        }
        debug!(conversation_id = ?id, "active conversation changed");
        self.mutate(|s| s.select(id))
    }

    /// Mark everything in a conversation read by the current user.
    ///
    /// Nothing happens, and the backend is not called, when there is nothing
    /// left to mark. Local read state changes only once the backend accepts
    /// the call, so a failed attempt can be retried.
    pub async fn mark_messages_as_read(&self, conversation_id: &ConversationId) -> Result<()> {
        let me = &self.current_user;
        let needed = self
            .read(|s| {
                let conversation = s.conversation(conversation_id)?;
                let unstamped = s.thread(conversation_id).iter().any(|m| !m.is_read_by(me))
                    || conversation
                        .last_message
                        .as_ref()
                        .is_some_and(|m| !m.is_read_by(me));
                Some(conversation.unread_for(me) > 0 || unstamped)
            })
            .ok_or_else(|| MessagingError::ConversationNotFound(conversation_id.clone()))?;
        if !needed {
            debug!(conversation_id = %conversation_id, "already read");
            return Ok(());
        }

        self.repository
            .mark_read(conversation_id, me)
            .await
            .map_err(|e| {
                warn!(conversation_id = %conversation_id, error = %e, "mark read failed");
                MessagingError::MarkReadFailure(e)
            })?;

        let now = Utc::now();
        let stamped = self.mutate(|s| {
            let mut stamped = 0usize;
            if let Some(thread) = s.messages.get_mut(conversation_id) {
                for m in thread.iter_mut().filter(|m| !m.is_read_by(me)) {
                    let _ = m.read_by.insert(me.clone(), now);
                    stamped += 1;
                }
            }
            if let Some(c) = s.conversation_mut(conversation_id) {
                if let Some(count) = c.unread_count.get_mut(me) {
                    *count = 0;
                }
                if let Some(last) = c.last_message.as_mut() {
                    let _ = last.read_by.entry(me.clone()).or_insert(now);
                }
            }
            stamped
        });
        info!(conversation_id = %conversation_id, stamped, "conversation marked read");
        Ok(())
    }

    /// Soft-delete a message. The local copy changes only once the backend
    /// has accepted the deletion.
    pub async fn delete_message(
        &self,
        message_id: &MessageId,
        conversation_id: &ConversationId,
    ) -> Result<()> {
        if message_id.is_pending() {
            return Err(MessagingError::InvalidInput(format!(
                "message {message_id} was never delivered; discard it instead"
            )));
        }
        self.repository
            .soft_delete_message(message_id)
            .await
            .map_err(|e| {
                warn!(message_id = %message_id, error = %e, "delete failed");
                MessagingError::DeleteFailure(e)
            })?;

        self.mutate(|s| {
            if let Some(m) = s
                .messages
                .get_mut(conversation_id)
                .and_then(|thread| thread.iter_mut().find(|m| &m.id == message_id))
            {
                self.tombstone(m);
            }
            if let Some(last) = s
                .conversation_mut(conversation_id)
                .and_then(|c| c.last_message.as_mut())
                .filter(|last| &last.id == message_id)
            {
                self.tombstone(last);
            }
            s.refresh_preview(conversation_id);
        });
        info!(conversation_id = %conversation_id, message_id = %message_id, "message deleted");
        Ok(())
    }

    /// Archive a conversation; it drops out of the default inbox.
    pub async fn archive_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.change_status(conversation_id, ConversationStatus::Archived)
            .await
    }

    /// Block a conversation; it accepts no further messages.
    pub async fn block_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.change_status(conversation_id, ConversationStatus::Blocked)
            .await
    }

    /// Return an archived conversation to the inbox.
    pub async fn unarchive_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        let blocked = self.read(|s| {
            s.conversation(conversation_id)
                .is_some_and(|c| c.status == ConversationStatus::Blocked)
        });
        if blocked {
            return Err(MessagingError::ConversationBlocked(conversation_id.clone()));
        }
        self.change_status(conversation_id, ConversationStatus::Active)
            .await
    }

    async fn change_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<()> {
        self.repository
            .set_conversation_status(conversation_id, status)
            .await
            .map_err(|e| {
                warn!(conversation_id = %conversation_id, %status, error = %e, "status change failed");
                MessagingError::StatusChangeFailure(e)
            })?;
        let now = Utc::now();
        self.mutate(|s| {
            if let Some(c) = s.conversation_mut(conversation_id) {
                c.status = status;
                c.updated_at = c.updated_at.max(now);
            }
            s.promote(conversation_id);
        });
        info!(conversation_id = %conversation_id, %status, "conversation status changed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────

    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let out = {
            let mut state = self.state.write();
            f(&mut state)
        };
        self.version.send_modify(|v| *v += 1);
        out
    }

    fn tombstone(&self, message: &mut Message) {
        message.is_deleted = true;
        message.content.clone_from(&self.config.tombstone_text);
        message.attachments.clear();
    }

    fn normalize(&self, mut message: Message) -> Message {
        if message.is_deleted {
            self.tombstone(&mut message);
        }
        message
    }

    fn normalize_conversation(&self, mut conversation: Conversation) -> Conversation {
        conversation.last_message = conversation.last_message.map(|m| self.normalize(m));
        conversation
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
