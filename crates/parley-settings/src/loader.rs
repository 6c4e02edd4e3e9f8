//! Loading: compiled defaults, then `~/.parley/settings.json` deep-merged on
//! top, then `PARLEY_*` environment overrides.
//!
//! When merging, objects merge per key, arrays and scalars from the file
//! replace the default, and `null` leaves the default in place.

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ParleySettings;

/// Root directory for parley state (`~/.parley`).
pub fn parley_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley")
}

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    parley_home().join("settings.json")
}

/// Directory holding session files, honoring `storage.sessionsDir`.
pub fn sessions_dir(settings: &ParleySettings) -> PathBuf {
    if settings.storage.sessions_dir.is_empty() {
        parley_home().join("sessions")
    } else {
        PathBuf::from(&settings.storage.sessions_dir)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides(settings, &|key| std::env::var(key).ok());
}

/// Apply overrides from any key lookup. Values that fail to parse or fall
/// outside their range are logged and skipped.
pub fn apply_overrides(settings: &mut ParleySettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.ranged("PARLEY_TURNS_TO_KEEP", 1..=1_000) {
        settings.context.turns_to_keep = v;
    }
    if let Some(v) = env.ranged("PARLEY_TOKEN_THRESHOLD", 0..=10_000_000) {
        settings.context.token_threshold = v;
    }
    if let Some(v) = env.flag("PARLEY_BACKUP_ENABLED") {
        settings.context.backup_enabled = v;
    }
    if let Some(v) = env.ranged("PARLEY_MAX_RETRIES", 1..=100) {
        settings.retry.max_retries = v;
    }
    if let Some(v) = env.ranged("PARLEY_RETRY_BASE_DELAY_MS", 0..=600_000) {
        settings.retry.base_delay_ms = v;
    }
    if let Some(v) = env.ranged("PARLEY_TOOL_TIMEOUT_MS", 100..=3_600_000) {
        settings.tools.tool_timeout_ms = v;
    }
    if let Some(v) = env.ranged("PARLEY_MAX_ITERATIONS", 1..=1_000) {
        settings.tools.max_iterations = v;
    }
    if let Some(v) = env.text("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.flag("PARLEY_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.text("PARLEY_SESSIONS_DIR") {
        settings.storage.sessions_dir = v;
    }
}

/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only if it lies in `range`.
pub fn parse_in_range<T>(val: &str, range: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = (self.lookup)(key)?;
        let parsed = parse_bool(&raw);
        if parsed.is_none() {
            warn!(key, value = %raw, "ignoring override, expected a boolean");
        }
        parsed
    }

    fn ranged<T>(&self, key: &str, range: RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd + Display,
    {
        let raw = (self.lookup)(key)?;
        let parsed = parse_in_range(&raw, &range);
        if parsed.is_none() {
            warn!(
                key,
                value = %raw,
                min = %range.start(),
                max = %range.end(),
                "ignoring override, out of range"
            );
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use serde_json::json;

    #[test]
    fn merge_nested_override() {
        let target = json!({"context": {"turnsToKeep": 5, "tokenThreshold": 100}});
        let source = json!({"context": {"turnsToKeep": 2}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["context"]["turnsToKeep"], 2);
        assert_eq!(merged["context"]["tokenThreshold"], 100);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"codes": [429, 500, 503]}), json!({"codes": [503]}));
        assert_eq!(merged["codes"], json!([503]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_object_replaces_primitive() {
        let merged = deep_merge(json!({"a": "string"}), json!({"a": {"nested": true}}));
        assert_eq!(merged["a"]["nested"], true);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.context.turns_to_keep, 5);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"retry": {"retryableStatusCodes": [429]}, "tools": {"failureThreshold": 5}}"#,
        )
        .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.retry.retryable_status_codes, vec![429]);
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.tools.failure_threshold, 5);
        assert_eq!(settings.tools.failure_window_secs, 300);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_file_value_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"context": {"turnsToKeep": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_in_range::<u64>("300", &(1..=1000)), Some(300));
        assert_eq!(parse_in_range::<u64>("0", &(1..=1000)), None);
        assert_eq!(parse_in_range::<usize>("-1", &(0..=10)), None);
        assert_eq!(parse_in_range::<usize>("abc", &(0..=10)), None);
    }

    #[test]
    fn overrides_apply_and_bad_values_are_skipped() {
        let vars = std::collections::HashMap::from([
            ("PARLEY_TURNS_TO_KEEP", "2"),
            ("PARLEY_MAX_RETRIES", "0"),
            ("PARLEY_LOG_JSON", "on"),
            ("PARLEY_BACKUP_ENABLED", "sometimes"),
            ("PARLEY_SESSIONS_DIR", ""),
        ]);
        let mut settings = ParleySettings::default();
        let backup_default = settings.context.backup_enabled;
        apply_overrides(&mut settings, &|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.context.turns_to_keep, 2);
        assert_eq!(settings.retry.max_retries, 3);
        assert!(settings.logging.json);
        assert_eq!(settings.context.backup_enabled, backup_default);
        assert!(settings.storage.sessions_dir.is_empty());
    }

    #[test]
    fn sessions_dir_default_and_override() {
        let mut settings = ParleySettings::default();
        assert!(sessions_dir(&settings).ends_with(".parley/sessions"));
        settings.storage.sessions_dir = "/var/parley".into();
        assert_eq!(sessions_dir(&settings), PathBuf::from("/var/parley"));
    }
}
