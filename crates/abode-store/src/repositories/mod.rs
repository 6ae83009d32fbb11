//! Stateless repositories over the `SQLite` schema.
//!
//! Each repository is a unit struct whose methods take `&Connection`, so
//! callers control transaction boundaries.

pub mod conversation;
pub mod message;

pub use conversation::{ConversationRepo, InsertConversation};
pub use message::MessageRepo;
