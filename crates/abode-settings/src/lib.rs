//! # abode-settings
//!
//! Configuration for the Abode messaging core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AbodeSettings::default()`]
//! 2. **User file**: `~/.abode/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ABODE_*` overrides (highest priority)
//!
//! There is no global instance: binaries load settings once at startup and
//! hand the relevant sections to the components that need them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    abode_home, apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = AbodeSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = AbodeSettings::default();
        assert_eq!(settings.messaging.page_size, 30);
        assert!(settings.messaging.auto_activate_created);
        assert!(settings.messaging.auto_mark_read);
        assert_eq!(settings.messaging.tombstone_text, "This message was deleted");
        assert_eq!(settings.storage.pool_size, 4);
        assert_eq!(settings.storage.busy_timeout_ms, 30_000);
        assert!(settings.storage.database_path.ends_with("messages.db"));
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.session.user_id.is_none());
    }
}
