//! Conversations, their participants and unread counters.

use std::fmt::Write;

use abode_core::{ConversationFilters, ConversationStatus};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::{ConversationRow, ParticipantRow};

/// Options for inserting a conversation.
pub struct InsertConversation<'a> {
    /// New conversation id.
    pub id: &'a str,
    /// Listing the conversation is about.
    pub property_id: Option<&'a str>,
    /// Creation timestamp (also the initial `updated_at`).
    pub created_at: &'a str,
}

/// Stateless; every method takes `&Connection`.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Insert a new active conversation.
    pub fn insert(conn: &Connection, opts: &InsertConversation<'_>) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO conversations (id, property_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'active', ?3, ?3)",
            params![opts.id, opts.property_id, opts.created_at],
        )?;
        Ok(())
    }

    /// Add a participant with an initial unread count.
    pub fn add_participant(
        conn: &Connection,
        conversation_id: &str,
        user_id: &str,
        unread_count: u32,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
             VALUES (?1, ?2, ?3)",
            params![conversation_id, user_id, unread_count],
        )?;
        Ok(())
    }

    /// Get a conversation row by ID.
    pub fn get_by_id(conn: &Connection, conversation_id: &str) -> Result<Option<ConversationRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM conversations WHERE id = ?1",
                params![conversation_id],
                ConversationRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List conversation rows, most recently updated first.
    ///
    /// Without a status filter, archived conversations are excluded.
    pub fn list(conn: &Connection, filters: &ConversationFilters) -> Result<Vec<ConversationRow>> {
        let mut sql = String::from("SELECT * FROM conversations WHERE 1=1");
        let mut param_values: Vec<String> = Vec::new();

        if let Some(property_id) = &filters.property_id {
            param_values.push(property_id.to_string());
            let _ = write!(sql, " AND property_id = ?{}", param_values.len());
        }
        if let Some(participant_id) = &filters.participant_id {
            param_values.push(participant_id.to_string());
            let _ = write!(
                sql,
                " AND id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ?{})",
                param_values.len()
            );
        }
        match filters.status {
            Some(status) => {
                param_values.push(status.as_str().to_string());
                let _ = write!(sql, " AND status = ?{}", param_values.len());
            }
            None => sql.push_str(" AND status != 'archived'"),
        }
        sql.push_str(" ORDER BY updated_at DESC, id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(param_values.iter()),
                ConversationRow::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Participants of a conversation, ordered by user id.
    pub fn participants(conn: &Connection, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
        let mut stmt = conn.prepare(
            "SELECT user_id, unread_count FROM conversation_participants
             WHERE conversation_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![conversation_id], |row| {
                Ok(ParticipantRow {
                    user_id: row.get(0)?,
                    unread_count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether `user_id` takes part in the conversation.
    pub fn is_participant(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Increment unread counters of everyone except `sender_id`.
    pub fn increment_unread_except(
        conn: &Connection,
        conversation_id: &str,
        sender_id: &str,
    ) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE conversation_participants SET unread_count = unread_count + 1
             WHERE conversation_id = ?1 AND user_id != ?2",
            params![conversation_id, sender_id],
        )?;
        Ok(changed)
    }

    /// Reset a participant's unread counter.
    pub fn reset_unread(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE conversation_participants SET unread_count = 0
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Advance `updated_at` (never moves it backwards).
    pub fn touch(conn: &Connection, conversation_id: &str, at: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE conversations SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
            params![at, conversation_id],
        )?;
        Ok(changed > 0)
    }

    /// Set the status and advance `updated_at`.
    pub fn set_status(
        conn: &Connection,
        conversation_id: &str,
        status: ConversationStatus,
        at: &str,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE conversations SET status = ?1, updated_at = MAX(updated_at, ?2) WHERE id = ?3",
            params![status.as_str(), at, conversation_id],
        )?;
        Ok(changed > 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
