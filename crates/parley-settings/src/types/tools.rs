//! Tool execution settings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    /// Identical failed calls tolerated inside the window before blocking.
    pub failure_threshold: usize,
    pub failure_window_secs: u64,
    /// Per-invocation time limit; exceeded calls are reported as KILLED.
    pub tool_timeout_ms: u64,
    /// Model calls allowed within one user turn.
    pub max_iterations: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window_secs: 300,
            tool_timeout_ms: 120_000,
            max_iterations: 25,
        }
    }
}
