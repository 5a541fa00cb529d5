//! Logger module
//!
//! Provides logging utilities including:
//! - Leveled diagnostics (error, warning, info, debug)
//! - Range reconciliation traces with multiple formats
//! - File-based logging support

mod format;
pub mod writer;

pub use format::{RangeTraceEntry, TraceSource};
pub use writer::LogLevel;

use crate::config::Config;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(&config.logging)
}

/// Write a diagnostic; before `init`, only warnings and errors reach stderr
fn write_error(level: LogLevel, message: &str) {
    match writer::get() {
        Some(w) => w.write_error(level, message),
        None if level <= LogLevel::Warn => eprintln!("{message}"),
        None => {}
    }
}

pub fn log_error(message: &str) {
    write_error(LogLevel::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(LogLevel::Warn, &format!("[WARN] {message}"));
}

pub fn log_info(message: &str) {
    write_error(LogLevel::Info, &format!("[INFO] {message}"));
}

pub fn log_debug(message: &str) {
    write_error(LogLevel::Debug, &format!("[DEBUG] {message}"));
}

/// Whether range traces are being recorded
pub fn trace_enabled() -> bool {
    writer::get().is_some_and(|w| w.trace_format().is_some())
}

/// Log formatted range trace entry
pub fn log_range_trace(entry: &RangeTraceEntry) {
    if let Some(w) = writer::get() {
        if let Some(format) = w.trace_format() {
            w.write_trace(&entry.format(format));
        }
    }
}
