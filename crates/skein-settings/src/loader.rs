//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SkeinSettings::default()`]
//! 2. If `~/.skein/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{ApiFlavor, SkeinSettings};

/// Resolve the path to the settings file (`~/.skein/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".skein").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SkeinSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged result is invalid, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SkeinSettings> {
    let defaults = serde_json::to_value(SkeinSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SkeinSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (file/default value wins).
pub fn apply_env_overrides(settings: &mut SkeinSettings) {
    if let Some(v) = read_env_flavor("SKEIN_API_FLAVOR") {
        settings.client.flavor = v;
    }
    if let Some(v) = read_env_string("SKEIN_ENDPOINT") {
        settings.client.endpoint = v;
    }
    if let Some(v) = read_env_string("SKEIN_DEPLOYMENT") {
        settings.client.deployment = v;
    }
    if let Some(v) = read_env_string("SKEIN_API_VERSION") {
        settings.client.api_version = v;
    }
    if let Some(v) = read_env_u64("SKEIN_READ_TIMEOUT_MS", 1000, 3_600_000) {
        settings.client.read_timeout_ms = v;
    }
    if let Some(v) = read_env_string("SKEIN_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Reject settings no client could be built from.
pub fn validate(settings: &SkeinSettings) -> Result<()> {
    let endpoint = &settings.client.endpoint;
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(SettingsError::invalid(
            "client.endpoint",
            format!("must be an http(s) URL, got {endpoint:?}"),
        ));
    }
    if settings.client.deployment.trim().is_empty() {
        return Err(SettingsError::invalid("client.deployment", "must not be empty"));
    }
    if settings.client.flavor == ApiFlavor::Azure && settings.client.api_version.trim().is_empty() {
        return Err(SettingsError::invalid(
            "client.apiVersion",
            "required for the azure flavor",
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_flavor(name: &str) -> Option<ApiFlavor> {
    let val = std::env::var(name).ok()?;
    let result = ApiFlavor::parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "unknown api flavor env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"b": 3});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_nested_objects() {
        let target = serde_json::json!({"client": {"endpoint": "x", "deployment": "y"}});
        let source = serde_json::json!({"client": {"deployment": "z"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["client"]["endpoint"], "x");
        assert_eq!(merged["client"]["deployment"], "z");
    }

    #[test]
    fn merge_skips_null_source_values() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = serde_json::json!({"list": [1, 2, 3]});
        let source = serde_json::json!({"list": [4]});
        assert_eq!(deep_merge(target, source)["list"], serde_json::json!([4]));
    }

    // ── parse_u64_range ─────────────────────────────────────────────

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_u64_range("1000", 1000, 2000), Some(1000));
        assert_eq!(parse_u64_range("2000", 1000, 2000), Some(2000));
        assert_eq!(parse_u64_range("999", 1000, 2000), None);
        assert_eq!(parse_u64_range("abc", 1000, 2000), None);
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_relative_endpoint() {
        let mut settings = SkeinSettings::default();
        settings.client.endpoint = "api.openai.com".to_string();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue { key: "client.endpoint", .. })
        ));
    }

    #[test]
    fn validate_requires_api_version_for_azure() {
        let mut settings = SkeinSettings::default();
        settings.client.flavor = ApiFlavor::Azure;
        settings.client.api_version = String::new();
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&SkeinSettings::default()).is_ok());
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.client.deployment, SkeinSettings::default().client.deployment);
    }

    #[test]
    fn file_values_are_merged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"client": {{"flavor": "azure", "endpoint": "https://res.openai.azure.com", "deployment": "chat"}}}}"#
        )
        .unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.client.flavor, ApiFlavor::Azure);
        assert_eq!(settings.client.endpoint, "https://res.openai.azure.com");
        assert_eq!(settings.client.deployment, "chat");
        assert_eq!(settings.client.api_version, "2023-07-01-preview");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }
}
