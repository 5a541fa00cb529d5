//! Range trace format module
//!
//! Supports multiple trace formats:
//! - `text` (one human-readable line per step)
//! - `json` (JSON structured logging)
//! - Custom patterns with variables

use std::fmt;

use chrono::Local;

/// Where the bytes for a sub-range come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSource {
    Cache,
    Network,
}

impl fmt::Display for TraceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Network => f.write_str("network"),
        }
    }
}

/// One range reconciliation step
#[derive(Debug, Clone)]
pub struct RangeTraceEntry {
    /// Step timestamp
    pub time: chrono::DateTime<Local>,
    /// Step name, e.g. `prepare_cache_validation`
    pub event: &'static str,
    /// Sub-range start (inclusive)
    pub start: i64,
    /// Sub-range end (inclusive), negative when open-ended
    pub end: i64,
    /// Cached extent start reported by the last probe
    pub cached_start: i64,
    /// Cached extent length reported by the last probe
    pub cached_len: i64,
    /// Resource size, 0 when unknown
    pub resource_size: i64,
    pub source: TraceSource,
    /// Whether this is the last sub-range
    pub final_range: bool,
}

impl RangeTraceEntry {
    /// Create a new trace entry with current timestamp
    pub fn new(event: &'static str, start: i64, end: i64, source: TraceSource) -> Self {
        Self {
            time: Local::now(),
            event,
            start,
            end,
            cached_start: 0,
            cached_len: 0,
            resource_size: 0,
            source,
            final_range: false,
        }
    }

    fn range(&self) -> String {
        if self.end < 0 {
            format!("{}-", self.start)
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }

    fn cached(&self) -> String {
        format!("{}+{}", self.cached_start, self.cached_len)
    }

    /// Format the entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "text" => self.format_text(),
            "json" => self.format_json(),
            custom => self.format_custom(custom),
        }
    }

    fn format_text(&self) -> String {
        format!(
            "[{}] [range] {} bytes={} source={} cached={} size={} final={}",
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.event,
            self.range(),
            self.source,
            self.cached(),
            self.resource_size,
            self.final_range,
        )
    }

    /// JSON structured log format
    fn format_json(&self) -> String {
        serde_json::json!({
            "time": self.time.to_rfc3339(),
            "event": self.event,
            "start": self.start,
            "end": self.end,
            "cached_start": self.cached_start,
            "cached_len": self.cached_len,
            "resource_size": self.resource_size,
            "source": self.source.to_string(),
            "final": self.final_range,
        })
        .to_string()
    }

    /// Custom format with variable substitution
    ///
    /// Supported variables:
    /// - `$time_iso8601` - ISO 8601 timestamp
    /// - `$event` - Step name
    /// - `$range` - Sub-range as `start-end`
    /// - `$cached` - Cached extent as `start+len`
    /// - `$resource_size` - Resource size
    /// - `$source` - `cache` or `network`
    /// - `$final` - Whether this is the last sub-range
    fn format_custom(&self, pattern: &str) -> String {
        pattern
            .replace("$time_iso8601", &self.time.to_rfc3339())
            .replace("$event", self.event)
            .replace("$range", &self.range())
            .replace("$cached", &self.cached())
            .replace("$resource_size", &self.resource_size.to_string())
            .replace("$source", &self.source.to_string())
            .replace("$final", &self.final_range.to_string())
    }
}
