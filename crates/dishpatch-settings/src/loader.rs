//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DishpatchSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `DISHPATCH_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use dishpatch_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::DishpatchSettings;

/// Resolve the settings file path.
///
/// `$DISHPATCH_HOME/settings.json` when set, else `~/.dishpatch/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(home) = read_env_string("DISHPATCH_HOME") {
        return PathBuf::from(home).join("settings.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".dishpatch").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DishpatchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DishpatchSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
fn load_file_layer(path: &Path) -> Result<DishpatchSettings> {
    let defaults = serde_json::to_value(DishpatchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `DISHPATCH_*` environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut DishpatchSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning, falling back to file/default.
pub fn apply_overrides_from(
    settings: &mut DishpatchSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let parsed = |name: &str, parse: &dyn Fn(&str) -> Option<u64>| -> Option<u64> {
        let val = string(name)?;
        let out = parse(&val);
        if out.is_none() {
            tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        out
    };

    let server = &mut settings.server;
    if let Some(v) = string("DISHPATCH_HOST") {
        server.host = v;
    }
    if let Some(v) = parsed("DISHPATCH_PORT", &|v| parse_u16_range(v, 0, 65535).map(u64::from)) {
        server.port = u16::try_from(v).unwrap_or(server.port);
    }
    if let Some(v) = parsed("DISHPATCH_MAX_CONNECTIONS", &|v| {
        parse_usize_range(v, 1, 1_000_000).map(|n| n as u64)
    }) {
        server.max_connections = usize::try_from(v).unwrap_or(server.max_connections);
    }
    if let Some(v) = parsed("DISHPATCH_HEARTBEAT_INTERVAL", &|v| parse_u64_range(v, 1, 3600)) {
        server.heartbeat_interval_secs = v;
    }
    if let Some(v) = parsed("DISHPATCH_HEARTBEAT_TIMEOUT", &|v| parse_u64_range(v, 1, 86_400)) {
        server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = parsed("DISHPATCH_SEND_QUEUE", &|v| {
        parse_usize_range(v, 1, 65_536).map(|n| n as u64)
    }) {
        server.send_queue_capacity = usize::try_from(v).unwrap_or(server.send_queue_capacity);
    }
    if let Some(v) = string("DISHPATCH_ADMIN_TOKEN") {
        server.admin_token = Some(v);
    }

    if let Some(v) = string("DISHPATCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("DISHPATCH_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "DISHPATCH_LOG_FORMAT", value = %v, "invalid env var, ignoring"),
        }
    }
}

/// Reject combinations no server can run with.
pub fn validate(settings: &DishpatchSettings) -> Result<()> {
    let server = &settings.server;
    if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "heartbeatTimeoutSecs ({}) must be >= heartbeatIntervalSecs ({})",
            server.heartbeat_timeout_secs, server.heartbeat_interval_secs
        )));
    }
    if server.max_connections == 0 {
        return Err(SettingsError::InvalidValue(
            "maxConnections must be at least 1".into(),
        ));
    }
    if server.max_message_size == 0 {
        return Err(SettingsError::InvalidValue(
            "maxMessageSize must be at least 1".into(),
        ));
    }
    if server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "sendQueueCapacity must be at least 1".into(),
        ));
    }
    if server.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(SettingsError::InvalidValue(
            "adminToken must not be blank".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
