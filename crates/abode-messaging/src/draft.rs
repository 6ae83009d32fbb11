//! Caller-supplied inputs for sending and starting conversations.

use std::collections::BTreeSet;

use abode_core::{Attachment, ConversationId, InitialMessage, MessageType, PropertyId, UserId};

use crate::errors::{MessagingError, Result};

/// A message the current user wants to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDraft {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Text payload.
    pub content: String,
    /// Payload kind.
    pub message_type: MessageType,
    /// Attachment descriptors.
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    /// A plain text message.
    pub fn text(conversation_id: impl Into<ConversationId>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            attachments: Vec::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_payload(&self.content, self.message_type, &self.attachments)
    }
}

/// A conversation the current user wants to start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationDraft {
    /// Everyone else taking part; the current user is added implicitly.
    pub participant_ids: BTreeSet<UserId>,
    /// Listing the conversation is about.
    pub property_id: Option<PropertyId>,
    /// First message.
    pub initial_message: InitialMessage,
}

impl ConversationDraft {
    /// Full participant set including `creator`.
    pub(crate) fn participants_with(&self, creator: &UserId) -> BTreeSet<UserId> {
        let mut all = self.participant_ids.clone();
        let _ = all.insert(creator.clone());
        all
    }

    pub(crate) fn validate(&self, creator: &UserId) -> Result<()> {
        if self.participant_ids.iter().all(|p| p == creator) {
            return Err(MessagingError::InvalidInput(
                "a conversation needs at least one other participant".to_string(),
            ));
        }
        let initial = &self.initial_message;
        validate_payload(&initial.content, initial.message_type, &initial.attachments)
    }
}

/// Content may be empty only for non-text messages that carry attachments.
fn validate_payload(content: &str, message_type: MessageType, attachments: &[Attachment]) -> Result<()> {
    if content.trim().is_empty() && (message_type == MessageType::Text || attachments.is_empty()) {
        return Err(MessagingError::InvalidInput(
            "message content is empty".to_string(),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn attachment() -> Attachment {
        Attachment {
            url: "https://cdn.example/floorplan.pdf".into(),
            name: "floorplan.pdf".into(),
            mime_type: Some("application/pdf".into()),
            size_bytes: Some(1024),
        }
    }

    #[test]
    fn empty_text_rejected() {
        let draft = MessageDraft::text("c1", "   ");
        assert_matches!(draft.validate(), Err(MessagingError::InvalidInput(_)));
    }

    #[test]
    fn empty_document_with_attachment_allowed() {
        let draft = MessageDraft {
            message_type: MessageType::Document,
            attachments: vec![attachment()],
            ..MessageDraft::text("c1", "")
        };
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn empty_text_with_attachment_still_rejected() {
        let draft = MessageDraft {
            attachments: vec![attachment()],
            ..MessageDraft::text("c1", "")
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn conversation_needs_someone_else() {
        let me = UserId::from("me");
        let draft = ConversationDraft {
            participant_ids: [me.clone()].into(),
            property_id: None,
            initial_message: InitialMessage {
                content: "hello".into(),
                ..Default::default()
            },
        };
        assert_matches!(draft.validate(&me), Err(MessagingError::InvalidInput(_)));

        let draft = ConversationDraft {
            participant_ids: [UserId::from("owner")].into(),
            ..draft
        };
        assert!(draft.validate(&me).is_ok());
        assert_eq!(draft.participants_with(&me).len(), 2);
    }
}
