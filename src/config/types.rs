// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub range: RangeConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Minimum level written: error, warn, info or debug
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit one trace line per range reconciliation step
    #[serde(default)]
    pub trace_ranges: bool,
    /// Trace format (text, json, or custom pattern)
    #[serde(default = "default_trace_format")]
    pub trace_format: String,
    /// Trace log file path (optional, stdout if not set)
    #[serde(default)]
    pub trace_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_log_level() -> String {
    "warn".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_trace_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            trace_ranges: false,
            trace_format: default_trace_format(),
            trace_log_file: None,
            error_log_file: None,
        }
    }
}

/// Byte-range reconciliation tunables
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RangeConfig {
    /// Upper bound on a single cache or network sub-range
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: i64,
    /// Resume truncated dense entries with a ranged request
    #[serde(default = "default_resume_truncated")]
    pub resume_truncated: bool,
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_chunk_len() -> i64 {
    i64::from(i32::MAX)
}

#[allow(clippy::missing_const_for_fn)]
fn default_resume_truncated() -> bool {
    true
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: default_max_chunk_len(),
            resume_truncated: default_resume_truncated(),
        }
    }
}

/// Freshness computation tunables
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FreshnessConfig {
    /// Share of `Date - Last-Modified` granted as heuristic freshness
    #[serde(default = "default_heuristic_percent")]
    pub heuristic_percent: u8,
}

#[allow(clippy::missing_const_for_fn)]
fn default_heuristic_percent() -> u8 {
    10
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            heuristic_percent: default_heuristic_percent(),
        }
    }
}
