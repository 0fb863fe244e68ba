//! # dishpatch-settings
//!
//! Layered configuration for the dishpatch server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`DishpatchSettings::default()`])
//! 2. **Settings file** (`~/.dishpatch/settings.json`, deep-merged over defaults)
//! 3. **Environment variables** (`DISHPATCH_*` overrides, highest priority)
//!
//! Command-line flags are applied by the binary on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
    validate,
};
pub use types::{DishpatchSettings, LoggingSettings, ServerSettings};
