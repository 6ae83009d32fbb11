//! # abode-messaging
//!
//! Client-side messaging state for the Abode marketplace.
//!
//! # Architecture
//!
//! - **[`MessagingStore`]**: the single source of truth for conversations,
//!   cached threads, pagination and loading/error flags. Every mutation goes
//!   through it and bumps a version that subscribers can watch.
//! - **[`MessagingFacade`]**: memoized read-only views plus the action
//!   surface, with the bootstrap and auto-read effects.
//! - **[`thread`]**: ordering, merge and preview rules shared by both.
//!
//! The store talks to persistence only through
//! [`ConversationRepository`](abode_core::ConversationRepository), so any
//! backend (the `SQLite` one in `abode-store`, a remote API, a test double)
//! can sit underneath.

#![deny(unsafe_code)]

pub mod config;
pub mod draft;
pub mod errors;
pub mod facade;
pub mod state;
pub mod store;
pub mod thread;
pub mod views;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::MessagingConfig;
pub use draft::{ConversationDraft, MessageDraft};
pub use errors::{FetchScope, MessagingError, Result};
pub use facade::MessagingFacade;
pub use state::{Pagination, StoreState};
pub use store::MessagingStore;
pub use views::MessagingView;
