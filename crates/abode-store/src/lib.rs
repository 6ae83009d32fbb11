//! # abode-store
//!
//! `SQLite` backend for the Abode conversation repository.
//!
//! # Architecture
//!
//! - **[`connection`]**: `r2d2` connection pool with WAL mode, foreign keys,
//!   and busy-timeout pragmas applied to every connection.
//! - **[`migrations`]**: Version-tracked schema evolution, embedded at compile
//!   time and run transactionally.
//! - **[`row_types`]**: Raw row structs and their conversion into domain types.
//! - **[`repositories`]**: Stateless repository structs; each method takes
//!   `&Connection` and executes SQL.
//! - **[`SqliteConversationRepository`]**: the
//!   [`ConversationRepository`](abode_core::ConversationRepository)
//!   implementation composing the repositories into transactional operations.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;

mod sqlite_repository;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::{current_version, latest_version, run_migrations};
pub use sqlite_repository::SqliteConversationRepository;
