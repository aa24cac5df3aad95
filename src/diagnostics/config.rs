//! Tunables read by the checks.
//!
//! Loaded from the `[checks]` section of `.kubediag.toml`; every field has a
//! default so a partial section is fine.

use serde::{Deserialize, Serialize};

/// Thresholds and switches consulted by individual checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Restart count at which the `resources` check warns.
    pub restart_warning_threshold: i32,

    /// Non-empty log lines kept in `last_lines` for a crash-looping container.
    pub crash_tail_lines: usize,

    /// Most recent events kept in a snapshot.
    pub max_events: usize,

    /// Warn on `:latest` or untagged images.
    pub flag_latest_tag: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            restart_warning_threshold: 3,
            crash_tail_lines: 5,
            max_events: 20,
            flag_latest_tag: true,
        }
    }
}

impl CheckConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_restart_warning_threshold(mut self, threshold: i32) -> Self {
        self.restart_warning_threshold = threshold;
        self
    }

    pub fn with_crash_tail_lines(mut self, lines: usize) -> Self {
        self.crash_tail_lines = lines;
        self
    }

    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    pub fn with_flag_latest_tag(mut self, flag: bool) -> Self {
        self.flag_latest_tag = flag;
        self
    }
}
