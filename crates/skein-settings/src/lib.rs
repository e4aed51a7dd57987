//! # skein-settings
//!
//! Layered configuration for the skein streaming client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SkeinSettings::default()`]
//! 2. **User file**: `~/.skein/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SKEIN_*` overrides (highest priority)
//!
//! API keys are never read from the settings file; binaries take them from
//! the environment.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
