use serde::{Deserialize, Serialize};

use crate::diagnostics::CheckConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub defaults: DefaultsConfig,
    pub checks: CheckConfig,
}

/// Fallbacks for flags the command line leaves unset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub namespace: Option<String>,
    pub output: String,
    /// Resources evaluated at once in bulk runs
    pub concurrency: usize,
    /// Gather deadline per resource
    pub timeout_secs: u64,
    pub tail_lines: i64,
    pub capture_logs: bool,
    /// Kubeconfig context
    pub context: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            output: "text".to_string(),
            concurrency: 4,
            timeout_secs: 30,
            tail_lines: 100,
            capture_logs: true,
            context: None,
        }
    }
}
