//! Plain-text rendering of conversations and messages.

use abode_core::{Conversation, DeliveryState, Message, UserId};

const PREVIEW_CHARS: usize = 60;

fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// One inbox row: id, status, counterparts, unread count and preview.
pub fn conversation_line(conversation: &Conversation, me: &UserId) -> String {
    let others: Vec<&str> = conversation
        .participants
        .iter()
        .filter(|p| *p != me)
        .map(UserId::as_str)
        .collect();
    let unread = conversation.unread_for(me);
    let preview = conversation
        .last_message
        .as_ref()
        .map(|m| truncate(&m.content, PREVIEW_CHARS))
        .unwrap_or_default();
    let property = conversation
        .property_id
        .as_ref()
        .map(|p| format!(" re {p}"))
        .unwrap_or_default();

    format!(
        "{id}  [{status}]  with {others}{property}  ({unread} unread)  {preview}",
        id = conversation.id,
        status = conversation.status,
        others = others.join(", "),
    )
}

/// One thread row: time, id, sender and content.
pub fn message_line(message: &Message, me: &UserId) -> String {
    let sender = if &message.sender_id == me {
        "you"
    } else {
        message.sender_id.as_str()
    };
    let marker = match &message.delivery {
        DeliveryState::Confirmed => String::new(),
        DeliveryState::Pending => " (sending)".to_string(),
        DeliveryState::Failed { error } => format!(" (failed: {error})"),
    };
    format!(
        "{time}  {id}  {sender}: {content}{marker}",
        time = message.created_at.format("%Y-%m-%d %H:%M"),
        id = message.id,
        content = message.content,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
