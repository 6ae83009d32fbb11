//! Thread pages, read receipts, soft delete and search.
//!
//! Thread order is `(created_at, id)` ascending everywhere; pages are cut
//! from the newest end so page 1 is the most recent slice of history.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use abode_core::{Message, SearchFilters, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::errors::Result;
use crate::row_types::{MessageRow, format_ts, parse_ts};

/// Stateless; every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message row.
    pub fn insert(conn: &Connection, row: &MessageRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, type, attachments,
             created_at, is_deleted, correlation_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id,
                row.conversation_id,
                row.sender_id,
                row.content,
                row.message_type,
                row.attachments,
                row.created_at,
                row.is_deleted,
                row.correlation_id,
            ],
        )?;
        Ok(())
    }

    /// Get a message row by ID.
    pub fn get_by_id(conn: &Connection, message_id: &str) -> Result<Option<MessageRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM messages WHERE id = ?1",
                params![message_id],
                MessageRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Number of messages in a conversation (deleted ones included).
    pub fn count(conn: &Connection, conversation_id: &str) -> Result<u32> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// One page of history, oldest first within the page.
    ///
    /// `page` is 1-based and counts backwards from the newest message.
    pub fn page(
        conn: &Connection,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt
            .query_map(
                params![conversation_id, i64::from(limit), offset],
                MessageRow::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// The conversation's preview message: newest non-deleted, else newest.
    pub fn latest(conn: &Connection, conversation_id: &str) -> Result<Option<MessageRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM messages WHERE conversation_id = ?1
                 ORDER BY is_deleted ASC, created_at DESC, id DESC LIMIT 1",
                params![conversation_id],
                MessageRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Record a read receipt (first read wins).
    pub fn add_receipt(conn: &Connection, message_id: &str, user_id: &str, at: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
            params![message_id, user_id, at],
        )?;
        Ok(())
    }

    /// Stamp every message of the conversation the user has not read yet.
    pub fn mark_all_read(
        conn: &Connection,
        conversation_id: &str,
        user_id: &str,
        at: &str,
    ) -> Result<usize> {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
             SELECT id, ?2, ?3 FROM messages WHERE conversation_id = ?1",
            params![conversation_id, user_id, at],
        )?;
        Ok(changed)
    }

    /// Flag a message deleted. Returns `false` if it does not exist.
    pub fn soft_delete(conn: &Connection, message_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE messages SET is_deleted = 1 WHERE id = ?1",
            params![message_id],
        )?;
        Ok(changed > 0)
    }

    /// Non-deleted messages matching `filters`, oldest first.
    pub fn search(
        conn: &Connection,
        conversation_id: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<MessageRow>> {
        let mut sql =
            String::from("SELECT * FROM messages WHERE conversation_id = ?1 AND is_deleted = 0");
        let mut param_values: Vec<String> = vec![conversation_id.to_string()];

        if let Some(query) = filters.query.as_deref().filter(|q| !q.is_empty()) {
            param_values.push(query.to_string());
            let _ = write!(
                sql,
                " AND instr(lower(content), lower(?{})) > 0",
                param_values.len()
            );
        }
        if let Some(start) = &filters.start_date {
            param_values.push(format_ts(start));
            let _ = write!(sql, " AND created_at >= ?{}", param_values.len());
        }
        if let Some(end) = &filters.end_date {
            param_values.push(format_ts(end));
            let _ = write!(sql, " AND created_at <= ?{}", param_values.len());
        }
        if !filters.message_types.is_empty() {
            let mut placeholders = Vec::with_capacity(filters.message_types.len());
            for t in &filters.message_types {
                param_values.push(t.as_str().to_string());
                placeholders.push(format!("?{}", param_values.len()));
            }
            let _ = write!(sql, " AND type IN ({})", placeholders.join(", "));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(param_values.iter()), MessageRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Read receipts for the given messages, keyed by message id.
    pub fn receipts(
        conn: &Connection,
        message_ids: &[&str],
    ) -> Result<HashMap<String, BTreeMap<UserId, DateTime<Utc>>>> {
        let mut out: HashMap<String, BTreeMap<UserId, DateTime<Utc>>> = HashMap::new();
        if message_ids.is_empty() {
            return Ok(out);
        }
        let placeholders = (1..=message_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT message_id, user_id, read_at FROM message_reads WHERE message_id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(message_ids.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (message_id, user_id, read_at) in rows {
            let _ = out
                .entry(message_id)
                .or_default()
                .insert(UserId::from(user_id), parse_ts(&read_at)?);
        }
        Ok(out)
    }

    /// Convert rows into domain messages with their read receipts attached.
    pub fn hydrate(conn: &Connection, rows: Vec<MessageRow>) -> Result<Vec<Message>> {
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        let mut receipts = Self::receipts(conn, &ids)?;
        rows.into_iter()
            .map(|row| {
                let read_by = receipts.remove(&row.id).unwrap_or_default();
                row.into_message(read_by)
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
