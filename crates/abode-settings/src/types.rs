//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file is valid: missing fields keep their default value.

use serde::{Deserialize, Serialize};

use crate::loader::abode_home;

/// Root settings type.
///
/// ```json
/// {
///   "messaging": { "pageSize": 50 },
///   "session": { "userId": "u-123" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AbodeSettings {
    /// Messaging store behaviour.
    pub messaging: MessagingSettings,
    /// Local database used by the CLI.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Authenticated session.
    pub session: SessionSettings,
}

/// Messaging store behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagingSettings {
    /// Messages fetched per history page.
    pub page_size: u32,
    /// Select a conversation as soon as it is created.
    pub auto_activate_created: bool,
    /// Mark a conversation read when it becomes active.
    pub auto_mark_read: bool,
    /// Content shown in place of a deleted message.
    pub tombstone_text: String,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            page_size: 30,
            auto_activate_created: true,
            auto_mark_read: true,
            tombstone_text: "This message was deleted".to_string(),
        }
    }
}

/// `SQLite` storage settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Database file path.
    pub database_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: abode_home().join("messages.db").to_string_lossy().into_owned(),
            pool_size: 4,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// The authenticated session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Id of the signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
