//! Host log forwarding.
//!
//! The engine logs through `tracing`; hosts that want those records in their
//! own pipeline (Logcat, os_log, a file) implement [`LoggerSink`] and hand it
//! to `core_runtime::logging::init_logging`.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Maps a native player's textual level ("fatal", "error", "warn", "info",
    /// "v", "debug", "trace") onto a [`LogLevel`]. Unknown levels are debug.
    pub fn from_native(level: &str) -> Self {
        match level {
            "fatal" | "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" | "status" => LogLevel::Info,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Debug,
        }
    }

    /// Lowercase name, also valid as an `EnvFilter` level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One record as handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitter, or `software_player` for lines forwarded
    /// from the native player.
    pub target: String,
    pub message: String,
    /// Structured fields, already redacted by the emitter.
    pub fields: HashMap<String, String>,
    /// Name of the innermost span the record was emitted in.
    pub span_id: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span_id: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }
}

/// Receives engine log records.
///
/// Called from a spawned task when a Tokio runtime is available, otherwise
/// inline on the emitting thread, so implementations must not block for
/// long. Media URIs and request headers arrive redacted unless the host
/// turned redaction off.
///
/// ```ignore
/// struct Logcat;
///
/// #[async_trait::async_trait]
/// impl LoggerSink for Logcat {
///     async fn log(&self, entry: LogEntry) -> Result<()> {
///         android_log(entry.level, &entry.target, &entry.message);
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Records below this level are dropped before an entry is built.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Writes entries to stderr, one line each. Meant for desktop runs and
/// examples.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

impl ConsoleLogger {
    fn line(entry: &LogEntry) -> String {
        let mut line = format!(
            "{} {:5} {}: {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.level.as_str().to_uppercase(),
            entry.target,
            entry.message
        );
        let mut fields: Vec<_> = entry.fields.iter().collect();
        fields.sort();
        for (key, value) in fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        line
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            eprintln!("{}", Self::line(&entry));
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}
