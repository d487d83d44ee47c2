//! # Logging & Tracing
//!
//! `tracing-subscriber` setup for the playback engine, plus the redaction
//! helpers every crate uses when a log line could carry a credential.
//!
//! ## Targets
//!
//! Engine crates log under their module paths. Lines produced by the
//! software player itself arrive under the [`NATIVE_TARGET`] target, so hosts
//! can keep them quiet (the default) or raise them while debugging a stream
//! without touching the engine's own verbosity.
//!
//! ## Host forwarding
//!
//! When [`LoggingConfig::logger_sink`] is set, every event that passes the
//! filter is also turned into a [`LogEntry`] and handed to the host's
//! [`LoggerSink`], off the emitting task when a Tokio runtime is running.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::logging::{ConsoleLogger, LogLevel};
//! use std::sync::Arc;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_native_level(LogLevel::Info)
//!         .with_logger_sink(Arc::new(ConsoleLogger::default())),
//! )?;
//!
//! tracing::info!(uri = %redact_uri(&request.uri), "Opening media");
//! ```

use crate::error::{Error, Result};

use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Target of log lines forwarded from the software player.
pub const NATIVE_TARGET: &str = "software_player";

const ENGINE_TARGETS: &[&str] = &["core_runtime", "core_playback", "core_service", "bridge_desktop"];

const REDACTED: &str = "[REDACTED]";

/// Whether [`redact_uri`] and [`redact_header`] mask values. Set by
/// [`init_logging`].
static REDACTION: AtomicBool = AtomicBool::new(true);

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Logging configuration.
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for the engine's own crates.
    pub level: LogLevel,
    /// Level for [`NATIVE_TARGET`].
    pub native_level: LogLevel,
    /// Mask credentials in logged URIs and headers.
    pub redact: bool,
    /// Full `EnvFilter` directive string, replacing the generated one.
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close (pretty) or the span list (json).
    pub spans: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            native_level: LogLevel::Warn,
            redact: true,
            filter: None,
            logger_sink: None,
            spans: false,
            display_target: true,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("native_level", &self.native_level)
            .field("redact", &self.redact)
            .field("filter", &self.filter)
            .field("logger_sink", &self.logger_sink.is_some())
            .field("spans", &self.spans)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_native_level(mut self, level: LogLevel) -> Self {
        self.native_level = level;
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, spans: bool) -> Self {
        self.spans = spans;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    /// The `EnvFilter` directives this configuration produces.
    pub fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        let mut directives = vec!["warn".to_string()];
        directives.extend(
            ENGINE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, self.level.as_str())),
        );
        directives.push(format!("{}={}", NATIVE_TARGET, self.native_level.as_str()));
        directives.join(",")
    }
}

/// Installs the global subscriber. Only the first call in a process
/// succeeds.
///
/// # Errors
///
/// - [`Error::Config`] for an invalid filter string
/// - [`Error::Logging`] when a global subscriber is already installed
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.directives())
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))?;
    REDACTION.store(config.redact, Ordering::Relaxed);

    let spans = if config.spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_writer(io::stderr);

    let fmt_layer = match config.format {
        LogFormat::Pretty => layer.pretty().with_span_events(spans).boxed(),
        LogFormat::Compact => layer.compact().with_span_events(spans).boxed(),
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(config.spans)
            .with_span_list(config.spans)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(config.logger_sink.map(LoggerSinkLayer))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Mirrors events into a host [`LoggerSink`].
struct LoggerSinkLayer(Arc<dyn LoggerSink>);

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if level < self.0.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields.message.unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (key, value) in fields.values {
            entry = entry.with_field(key, value);
        }
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span_id(span.name());
        }

        let sink = Arc::clone(&self.0);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", e);
                }
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: BTreeMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

fn redaction_enabled() -> bool {
    REDACTION.load(Ordering::Relaxed)
}

/// Masks credentials in a media URI's query string.
///
/// Values of parameters whose name contains `token`, `key` or `auth`
/// (case-insensitive) become `[REDACTED]`. Returns the input unchanged when
/// redaction was disabled with [`LoggingConfig::with_redaction`].
///
/// ```
/// use core_runtime::logging::redact_uri;
///
/// assert_eq!(
///     redact_uri("https://media.example/v.mkv?X-Plex-Token=abc&offset=3"),
///     "https://media.example/v.mkv?X-Plex-Token=[REDACTED]&offset=3"
/// );
/// ```
pub fn redact_uri(uri: &str) -> String {
    if !redaction_enabled() {
        return uri.to_string();
    }

    let Some((base, rest)) = uri.split_once('?') else {
        return uri.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let params: Vec<String> = query
        .split('&')
        .map(|param| match param.split_once('=') {
            Some((name, _)) if is_credential(name) => format!("{}={}", name, REDACTED),
            _ => param.to_string(),
        })
        .collect();

    let mut redacted = format!("{}?{}", base, params.join("&"));
    if let Some(fragment) = fragment {
        redacted.push('#');
        redacted.push_str(fragment);
    }
    redacted
}

/// Value of an HTTP request header as it may be logged.
///
/// `Authorization`, `Cookie` and any header whose name looks like a
/// credential are masked.
pub fn redact_header<'a>(name: &str, value: &'a str) -> &'a str {
    let lower = name.to_lowercase();
    if redaction_enabled() && (lower == "authorization" || lower.contains("cookie") || is_credential(&lower)) {
        REDACTED
    } else {
        value
    }
}

fn is_credential(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("token") || lower.contains("key") || lower.contains("auth")
}

/// File name of a local path or URI, for logging subtitle sources without
/// the directory layout of the device.
///
/// ```
/// use core_runtime::logging::strip_path;
///
/// assert_eq!(strip_path("/storage/emulated/0/Movies/film.en.srt"), "film.en.srt");
/// ```
pub fn strip_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
