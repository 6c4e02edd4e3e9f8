//! Context store and context provider settings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// User turns whose ephemeral tool traffic survives aging.
    pub turns_to_keep: usize,
    /// Token budget the usage ratio is computed against. Zero disables the ratio.
    pub token_threshold: u64,
    /// Schedule a session backup after every mutation.
    pub backup_enabled: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            turns_to_keep: 5,
            token_threshold: 200_000,
            backup_enabled: true,
        }
    }
}

/// Just-in-time context providers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// Upper bound on the whole provider fan-out.
    pub timeout_ms: u64,
    /// Include the resource status overview in every request.
    pub resource_overview: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            resource_overview: true,
        }
    }
}
