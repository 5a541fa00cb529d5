//! Log writer module
//!
//! Provides thread-safe log writing to files or stdout/stderr, with a
//! level filter for diagnostics and a separate target for range traces.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use crate::config::LoggingConfig;

/// Global log writer instance
static LOG_WRITER: OnceLock<LogWriter> = OnceLock::new();

/// Diagnostic severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" | "trace" => Ok(Self::Debug),
            _ => Err(()),
        }
    }
}

/// Log output target
enum LogTarget {
    /// Write to stdout
    Stdout,
    /// Write to stderr
    Stderr,
    /// Write to file
    File(Mutex<File>),
}

/// Thread-safe log writer
pub struct LogWriter {
    level: LogLevel,
    /// Range trace format, None when tracing is off
    trace_format: Option<String>,
    /// Range trace target
    trace: LogTarget,
    /// Diagnostics target
    error: LogTarget,
}

impl LogWriter {
    /// Create a new log writer from logging settings
    fn new(config: &LoggingConfig) -> io::Result<Self> {
        let trace = match config.trace_log_file.as_deref() {
            Some(path) => LogTarget::File(Mutex::new(open_log_file(path)?)),
            None => LogTarget::Stdout,
        };

        let error = match config.error_log_file.as_deref() {
            Some(path) => LogTarget::File(Mutex::new(open_log_file(path)?)),
            None => LogTarget::Stderr,
        };

        Ok(Self {
            level: config.level.parse().unwrap_or(LogLevel::Warn),
            trace_format: config
                .trace_ranges
                .then(|| config.trace_format.clone()),
            trace,
            error,
        })
    }

    pub const fn level(&self) -> LogLevel {
        self.level
    }

    pub fn trace_format(&self) -> Option<&str> {
        self.trace_format.as_deref()
    }

    /// Write a diagnostic if `level` passes the filter
    pub fn write_error(&self, level: LogLevel, message: &str) {
        if level <= self.level {
            write_to_target(&self.error, message);
        }
    }

    /// Write to range trace log
    pub fn write_trace(&self, message: &str) {
        write_to_target(&self.trace, message);
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

/// Write message to log target
fn write_to_target(target: &LogTarget, message: &str) {
    match target {
        LogTarget::Stdout => {
            println!("{message}");
        }
        LogTarget::Stderr => {
            eprintln!("{message}");
        }
        LogTarget::File(file) => {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{message}");
            }
        }
    }
}

/// Initialize the global log writer
///
/// This should be called once at startup.
/// Returns error if log files cannot be opened.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    let writer = LogWriter::new(config)?;
    LOG_WRITER.set(writer).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Log writer already initialized",
        )
    })
}

/// Get the global log writer, if initialized
pub fn get() -> Option<&'static LogWriter> {
    LOG_WRITER.get()
}

/// Check if the log writer has been initialized
pub fn is_initialized() -> bool {
    LOG_WRITER.get().is_some()
}
