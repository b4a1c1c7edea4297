//! Settings Models
//!
//! Application configuration and settings data structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for stream reconciliation and cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// How long to wait for a `stream_aborted` ack before cancelling locally
    #[serde(default = "default_abort_timeout_ms")]
    pub abort_timeout_ms: u64,
    /// Accumulated phase text must be longer than this (in characters) before
    /// an incoming chunk is considered a full-content resend
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_replace_min_len: usize,
    /// Number of leading characters compared when detecting a resend
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_prefix_len: usize,
}

fn default_abort_timeout_ms() -> u64 {
    10_000
}

fn default_duplicate_threshold() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            abort_timeout_ms: default_abort_timeout_ms(),
            duplicate_replace_min_len: default_duplicate_threshold(),
            duplicate_prefix_len: default_duplicate_threshold(),
        }
    }
}

impl StreamSettings {
    pub fn abort_timeout(&self) -> Duration {
        Duration::from_millis(self.abort_timeout_ms)
    }
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stream reconciliation settings
    #[serde(default)]
    pub stream: StreamSettings,
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream: StreamSettings::default(),
            log_level: default_log_level(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub abort_timeout_ms: Option<u64>,
    pub duplicate_replace_min_len: Option<usize>,
    pub duplicate_prefix_len: Option<usize>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(timeout) = update.abort_timeout_ms {
            self.stream.abort_timeout_ms = timeout;
        }
        if let Some(min_len) = update.duplicate_replace_min_len {
            self.stream.duplicate_replace_min_len = min_len;
        }
        if let Some(prefix_len) = update.duplicate_prefix_len {
            self.stream.duplicate_prefix_len = prefix_len;
        }
        if let Some(level) = update.log_level {
            self.log_level = level;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.stream.abort_timeout_ms < 100 {
            return Err("abort_timeout_ms must be at least 100 milliseconds".to_string());
        }
        if self.stream.abort_timeout_ms > 300_000 {
            return Err("abort_timeout_ms cannot exceed 5 minutes".to_string());
        }

        // A zero-length prefix would treat any longer chunk as a resend
        if self.stream.duplicate_prefix_len == 0 {
            return Err("duplicate_prefix_len must be greater than zero".to_string());
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level: {}. Must be one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        Ok(())
    }
}
