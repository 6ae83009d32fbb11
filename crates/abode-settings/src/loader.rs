//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AbodeSettings::default()`]
//! 2. If `~/.abode/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `ABODE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::AbodeSettings;

/// Directory holding Abode's local files (`~/.abode`).
pub fn abode_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".abode")
}

/// Resolve the path to the settings file (`~/.abode/settings.json`).
pub fn settings_path() -> PathBuf {
    abode_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AbodeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AbodeSettings> {
    let defaults = serde_json::to_value(AbodeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AbodeSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ABODE_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (file/default value wins).
pub fn apply_overrides(settings: &mut AbodeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("ABODE_PAGE_SIZE") {
        match parse_u32_range(&v, 1, 200) {
            Some(n) => settings.messaging.page_size = n,
            None => warn!(key = "ABODE_PAGE_SIZE", value = %v, "invalid page size env var, ignoring"),
        }
    }
    if let Some(v) = read("ABODE_AUTO_MARK_READ") {
        match parse_bool(&v) {
            Some(b) => settings.messaging.auto_mark_read = b,
            None => warn!(key = "ABODE_AUTO_MARK_READ", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("ABODE_DB_PATH") {
        settings.storage.database_path = v;
    }
    if let Some(v) = read("ABODE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("ABODE_USER_ID") {
        settings.session.user_id = Some(v);
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
