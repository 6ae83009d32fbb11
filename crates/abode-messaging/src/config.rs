//! Store configuration.

use abode_settings::MessagingSettings;

/// Behaviour knobs for [`MessagingStore`](crate::MessagingStore).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagingConfig {
    /// Messages per thread page.
    pub page_size: u32,
    /// Select a conversation as soon as it is created.
    pub auto_activate_created: bool,
    /// Mark the active conversation read when it is selected.
    pub auto_mark_read: bool,
    /// Content shown in place of a deleted message.
    pub tombstone_text: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self::from(&MessagingSettings::default())
    }
}

impl From<&MessagingSettings> for MessagingConfig {
    fn from(settings: &MessagingSettings) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            auto_activate_created: settings.auto_activate_created,
            auto_mark_read: settings.auto_mark_read,
            tombstone_text: settings.tombstone_text.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings_defaults() {
        let config = MessagingConfig::default();
        assert_eq!(config.page_size, 30);
        assert!(config.auto_activate_created);
        assert!(config.auto_mark_read);
        assert_eq!(config.tombstone_text, "This message was deleted");
    }

    #[test]
    fn zero_page_size_is_raised() {
        let settings = MessagingSettings {
            page_size: 0,
            auto_mark_read: false,
            ..MessagingSettings::default()
        };
        let config = MessagingConfig::from(&settings);
        assert_eq!(config.page_size, 1);
        assert!(!config.auto_mark_read);
    }
}
