//! # abode-core
//!
//! Foundation types for the Abode messaging core.
//!
//! This crate provides the shared vocabulary that the store, the `SQLite`
//! backend and the CLI all depend on:
//!
//! - **Branded IDs**: `ConversationId`, `MessageId`, `UserId`, `PropertyId`,
//!   `CorrelationId` as newtypes for type safety
//! - **Conversations**: [`Conversation`] with participants, unread counters,
//!   status and the denormalized last-message preview
//! - **Messages**: [`Message`] with read receipts, soft-delete flag and local
//!   delivery state, totally ordered by `(created_at, id)`
//! - **Repository contract**: [`ConversationRepository`], the async seam to
//!   whatever backend persists conversations
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod conversation;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;
pub mod repository;

pub use conversation::{Conversation, ConversationStatus};
pub use errors::{RepositoryError, Result};
pub use ids::{ConversationId, CorrelationId, MessageId, PropertyId, UserId};
pub use message::{Attachment, DeliveryState, Message, MessageType, order_cmp};
pub use repository::{
    ConversationFilters, ConversationRepository, InitialMessage, MessagePage, NewConversation,
    NewMessage, SearchFilters,
};
