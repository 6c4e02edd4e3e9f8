//! Settings type definitions.
//!
//! All types use camelCase field names and `#[serde(default)]`, so a partial
//! JSON file only needs to name the values it changes.

mod context;
mod runtime;
mod tools;

pub use context::*;
pub use runtime::*;
pub use tools::*;

pub use parley_core::RetryConfig;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// Loaded from `~/.parley/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    pub context: ContextSettings,
    /// Model-call retry policy.
    pub retry: RetryConfig,
    pub tools: ToolSettings,
    pub providers: ProviderSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
}

impl ParleySettings {
    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.context.turns_to_keep == 0 {
            return Err(SettingsError::InvalidValue(
                "context.turnsToKeep must be at least 1".into(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(SettingsError::InvalidValue(
                "retry.maxRetries must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SettingsError::InvalidValue(format!(
                "retry.jitterFactor {} outside 0.0..=1.0",
                self.retry.jitter_factor
            )));
        }
        if self.tools.failure_threshold == 0 {
            return Err(SettingsError::InvalidValue(
                "tools.failureThreshold must be at least 1".into(),
            ));
        }
        if self.tools.max_iterations == 0 {
            return Err(SettingsError::InvalidValue(
                "tools.maxIterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ParleySettings::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ParleySettings =
            serde_json::from_str(r#"{"context": {"turnsToKeep": 2}}"#).unwrap();
        assert_eq!(settings.context.turns_to_keep, 2);
        assert_eq!(settings.context.token_threshold, 200_000);
        assert_eq!(settings.retry.max_retries, 3);
    }

    #[test]
    fn zero_turns_rejected() {
        let mut settings = ParleySettings::default();
        settings.context.turns_to_keep = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn jitter_out_of_range_rejected() {
        let mut settings = ParleySettings::default();
        settings.retry.jitter_factor = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ParleySettings::default()).unwrap();
        assert!(json["context"].get("turnsToKeep").is_some());
        assert!(json["retry"].get("retryableStatusCodes").is_some());
        assert!(json["tools"].get("failureWindowSecs").is_some());
    }
}
