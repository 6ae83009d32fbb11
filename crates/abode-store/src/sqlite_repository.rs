//! [`ConversationRepository`] backed by the `SQLite` pool.
//!
//! Every operation checks out a pooled connection on the blocking thread pool
//! and composes the stateless repositories inside one transaction.

use abode_core::{
    Conversation, ConversationFilters, ConversationId, ConversationRepository, ConversationStatus,
    Message, MessageId, MessagePage, NewConversation, NewMessage, RepositoryError, SearchFilters,
    UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::{ConversationRepo, InsertConversation, MessageRepo};
use crate::row_types::{ConversationRow, MessageRow, format_ts};

/// `SQLite` implementation of the conversation backend.
#[derive(Clone)]
pub struct SqliteConversationRepository {
    pool: ConnectionPool,
}

impl SqliteConversationRepository {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a fresh in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::migrated(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Open (or create) a database file and bring its schema up to date.
    pub fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        Self::migrated(connection::new_file(path, config)?)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn migrated(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> abode_core::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| RepositoryError::Internal(format!("{op} task failed: {e}")))?;

        outcome.map_err(|e| {
            warn!(op, error = %e, "repository operation failed");
            RepositoryError::from(e)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blocking helpers
// ─────────────────────────────────────────────────────────────────────────────

fn require_conversation(conn: &Connection, conversation_id: &str) -> Result<ConversationRow> {
    ConversationRepo::get_by_id(conn, conversation_id)?
        .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))
}

fn load_conversation(conn: &Connection, row: ConversationRow) -> Result<Conversation> {
    let participants = ConversationRepo::participants(conn, &row.id)?;
    let last_message = match MessageRepo::latest(conn, &row.id)? {
        Some(latest) => MessageRepo::hydrate(conn, vec![latest])?.pop(),
        None => None,
    };
    row.into_conversation(participants, last_message)
}

fn load_message(conn: &Connection, message_id: &str) -> Result<Message> {
    let row = MessageRepo::get_by_id(conn, message_id)?
        .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
    MessageRepo::hydrate(conn, vec![row])?
        .pop()
        .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))
}

fn validate_content(content: &str, has_attachments: bool) -> Result<()> {
    if content.trim().is_empty() && !has_attachments {
        return Err(StoreError::InvalidOperation(
            "message has no content".to_string(),
        ));
    }
    Ok(())
}

fn insert_conversation(conn: &Connection, new: &NewConversation) -> Result<String> {
    let mut participants = new.participant_ids.clone();
    let _ = participants.insert(new.creator_id.clone());
    if participants.len() < 2 {
        return Err(StoreError::InvalidOperation(
            "a conversation needs at least two participants".to_string(),
        ));
    }
    let initial = &new.initial_message;
    validate_content(&initial.content, !initial.attachments.is_empty())?;

    let conversation_id = ConversationId::new().into_inner();
    let at = format_ts(&new.created_at);

    let tx = conn.unchecked_transaction()?;
    ConversationRepo::insert(
        &tx,
        &InsertConversation {
            id: &conversation_id,
            property_id: new.property_id.as_deref(),
            created_at: &at,
        },
    )?;
    for user in &participants {
        let unread = u32::from(*user != new.creator_id);
        ConversationRepo::add_participant(&tx, &conversation_id, user, unread)?;
    }

    let message_id = MessageId::new().into_inner();
    MessageRepo::insert(
        &tx,
        &MessageRow {
            id: message_id.clone(),
            conversation_id: conversation_id.clone(),
            sender_id: new.creator_id.to_string(),
            content: initial.content.clone(),
            message_type: initial.message_type.as_str().to_string(),
            attachments: serde_json::to_string(&initial.attachments)?,
            created_at: at.clone(),
            is_deleted: false,
            correlation_id: None,
        },
    )?;
    MessageRepo::add_receipt(&tx, &message_id, &new.creator_id, &at)?;
    tx.commit()?;

    debug!(
        conversation_id = %conversation_id,
        participants = participants.len(),
        "conversation created"
    );
    Ok(conversation_id)
}

fn insert_message(conn: &Connection, new: &NewMessage) -> Result<String> {
    let conversation = require_conversation(conn, &new.conversation_id)?;
    if conversation.status == ConversationStatus::Blocked.as_str() {
        return Err(StoreError::InvalidOperation(format!(
            "conversation {} is blocked",
            new.conversation_id
        )));
    }
    if !ConversationRepo::is_participant(conn, &new.conversation_id, &new.sender_id)? {
        return Err(StoreError::InvalidOperation(format!(
            "{} is not a participant of {}",
            new.sender_id, new.conversation_id
        )));
    }
    validate_content(&new.content, !new.attachments.is_empty())?;

    let message_id = MessageId::new().into_inner();
    let at = format_ts(&new.created_at);

    let tx = conn.unchecked_transaction()?;
    MessageRepo::insert(
        &tx,
        &MessageRow {
            id: message_id.clone(),
            conversation_id: new.conversation_id.to_string(),
            sender_id: new.sender_id.to_string(),
            content: new.content.clone(),
            message_type: new.message_type.as_str().to_string(),
            attachments: serde_json::to_string(&new.attachments)?,
            created_at: at.clone(),
            is_deleted: false,
            correlation_id: new.correlation_id.as_ref().map(ToString::to_string),
        },
    )?;
    MessageRepo::add_receipt(&tx, &message_id, &new.sender_id, &at)?;
    let _ = ConversationRepo::increment_unread_except(&tx, &new.conversation_id, &new.sender_id)?;
    let _ = ConversationRepo::touch(&tx, &new.conversation_id, &at)?;
    tx.commit()?;

    debug!(
        conversation_id = %new.conversation_id,
        message_id = %message_id,
        "message stored"
    );
    Ok(message_id)
}

fn mark_conversation_read(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<()> {
    let _ = require_conversation(conn, conversation_id)?;
    if !ConversationRepo::is_participant(conn, conversation_id, user_id)? {
        return Err(StoreError::InvalidOperation(format!(
            "{user_id} is not a participant of {conversation_id}"
        )));
    }
    let at = format_ts(&Utc::now());
    let tx = conn.unchecked_transaction()?;
    let stamped = MessageRepo::mark_all_read(&tx, conversation_id, user_id, &at)?;
    let _ = ConversationRepo::reset_unread(&tx, conversation_id, user_id)?;
    tx.commit()?;
    debug!(conversation_id, user_id, stamped, "conversation marked read");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository seam
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ConversationRepository for SqliteConversationRepository {
    async fn list_conversations(
        &self,
        filters: &ConversationFilters,
    ) -> abode_core::Result<Vec<Conversation>> {
        let filters = filters.clone();
        self.run("list_conversations", move |conn| {
            ConversationRepo::list(conn, &filters)?
                .into_iter()
                .map(|row| load_conversation(conn, row))
                .collect()
        })
        .await
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> abode_core::Result<MessagePage> {
        let conversation_id = conversation_id.clone();
        self.run("list_messages", move |conn| {
            if page == 0 || limit == 0 {
                return Err(StoreError::InvalidOperation(format!(
                    "invalid page {page} / limit {limit}"
                )));
            }
            let _ = require_conversation(conn, &conversation_id)?;
            let total = MessageRepo::count(conn, &conversation_id)?;
            let rows = MessageRepo::page(conn, &conversation_id, page, limit)?;
            Ok(MessagePage {
                messages: MessageRepo::hydrate(conn, rows)?,
                total,
            })
        })
        .await
    }

    async fn create_message(&self, message: &NewMessage) -> abode_core::Result<Message> {
        let message = message.clone();
        self.run("create_message", move |conn| {
            let id = insert_message(conn, &message)?;
            load_message(conn, &id)
        })
        .await
    }

    async fn create_conversation(
        &self,
        conversation: &NewConversation,
    ) -> abode_core::Result<Conversation> {
        let conversation = conversation.clone();
        self.run("create_conversation", move |conn| {
            let id = insert_conversation(conn, &conversation)?;
            load_conversation(conn, require_conversation(conn, &id)?)
        })
        .await
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        participant_id: &UserId,
    ) -> abode_core::Result<()> {
        let conversation_id = conversation_id.clone();
        let participant_id = participant_id.clone();
        self.run("mark_read", move |conn| {
            mark_conversation_read(conn, &conversation_id, &participant_id)
        })
        .await
    }

    async fn soft_delete_message(&self, message_id: &MessageId) -> abode_core::Result<()> {
        let message_id = message_id.clone();
        self.run("soft_delete_message", move |conn| {
            if !MessageRepo::soft_delete(conn, &message_id)? {
                return Err(StoreError::MessageNotFound(message_id.into_inner()));
            }
            debug!(message_id = %message_id, "message soft-deleted");
            Ok(())
        })
        .await
    }

    async fn set_conversation_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> abode_core::Result<()> {
        let conversation_id = conversation_id.clone();
        self.run("set_conversation_status", move |conn| {
            let at = format_ts(&Utc::now());
            if !ConversationRepo::set_status(conn, &conversation_id, status, &at)? {
                return Err(StoreError::ConversationNotFound(conversation_id.into_inner()));
            }
            debug!(conversation_id = %conversation_id, %status, "conversation status changed");
            Ok(())
        })
        .await
    }

    async fn search_messages(
        &self,
        conversation_id: &ConversationId,
        filters: &SearchFilters,
    ) -> abode_core::Result<Vec<Message>> {
        let conversation_id = conversation_id.clone();
        let filters = filters.clone();
        self.run("search_messages", move |conn| {
            let _ = require_conversation(conn, &conversation_id)?;
            let rows = MessageRepo::search(conn, &conversation_id, &filters)?;
            MessageRepo::hydrate(conn, rows)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
