//! Thread ordering rules.
//!
//! A cached thread is kept sorted by `(created_at, id)` with unique ids.
//! [`merge_messages`] is the only way pages enter the cache, and
//! [`reconcile_last_message`] re-derives a conversation's preview after
//! every change that could move it.

use std::collections::{HashMap, HashSet};

use abode_core::{Conversation, CorrelationId, Message, MessageId, order_cmp};

/// Merge `incoming` into `existing`.
///
/// Entries are deduplicated by id, with `incoming` winning. An unconfirmed
/// local entry is dropped when `incoming` holds a confirmed copy with the
/// same correlation id. The result is sorted, so the outcome does not
/// depend on the order in which pages arrive.
pub fn merge_messages(existing: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    let confirmed: HashSet<CorrelationId> = incoming
        .iter()
        .filter(|m| m.delivery.is_confirmed())
        .filter_map(|m| m.correlation_id.clone())
        .collect();

    let mut by_id: HashMap<MessageId, Message> =
        HashMap::with_capacity(existing.len() + incoming.len());
    for message in existing {
        let superseded = !message.delivery.is_confirmed()
            && message
                .correlation_id
                .as_ref()
                .is_some_and(|c| confirmed.contains(c));
        if !superseded {
            let _ = by_id.insert(message.id.clone(), message);
        }
    }
    for message in incoming {
        let _ = by_id.insert(message.id.clone(), message);
    }

    let mut merged: Vec<Message> = by_id.into_values().collect();
    merged.sort_by(order_cmp);
    merged
}

/// The preview candidate among `messages`: the highest-ordered non-deleted
/// message, or the highest-ordered one overall if all are deleted.
pub fn latest_message<'a, I>(messages: I) -> Option<&'a Message>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut newest: Option<&Message> = None;
    let mut newest_live: Option<&Message> = None;
    for m in messages {
        if newest.is_none_or(|n| order_cmp(m, n).is_gt()) {
            newest = Some(m);
        }
        if !m.is_deleted && newest_live.is_none_or(|n| order_cmp(m, n).is_gt()) {
            newest_live = Some(m);
        }
    }
    newest_live.or(newest)
}

/// Recompute `conversation.last_message` from the cached `thread` and the
/// current preview.
///
/// The current preview only competes when it is a confirmed message the
/// thread knows nothing about, so a thread that was never fetched still
/// yields a sensible preview. An unconfirmed preview never outlives its
/// thread entry, and one whose correlation id now belongs to a thread entry
/// has been superseded by it. Returns whether the preview changed.
pub fn reconcile_last_message(conversation: &mut Conversation, thread: &[Message]) -> bool {
    let current = conversation
        .last_message
        .as_ref()
        .filter(|last| last.conversation_id == conversation.id && last.delivery.is_confirmed())
        .filter(|last| {
            !thread.iter().any(|m| {
                m.id == last.id
                    || (last.correlation_id.is_some() && m.correlation_id == last.correlation_id)
            })
        });

    let next = latest_message(thread.iter().chain(current)).cloned();
    if next == conversation.last_message {
        return false;
    }
    conversation.last_message = next;
    true
}

/// Replace the unconfirmed entry carrying `correlation_id` with the
/// backend's `confirmed` record.
///
/// Any copy of `confirmed` already merged by a concurrent fetch is dropped
/// first, so the thread ends up with exactly one entry for the message.
pub fn confirm_pending(
    thread: &mut Vec<Message>,
    correlation_id: &CorrelationId,
    confirmed: Message,
) {
    thread.retain(|m| m.id != confirmed.id);
    let slot = thread.iter().position(|m| {
        !m.delivery.is_confirmed() && m.correlation_id.as_ref() == Some(correlation_id)
    });
    match slot {
        Some(i) => thread[i] = confirmed,
        None => thread.push(confirmed),
    }
    thread.sort_by(order_cmp);
}

/// Whether `messages` is strictly ordered by `(created_at, id)`.
pub fn is_strictly_ordered(messages: &[Message]) -> bool {
    messages
        .windows(2)
        .all(|pair| order_cmp(&pair[0], &pair[1]).is_lt())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
