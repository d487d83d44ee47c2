//! # Backend Capability Contract
//!
//! [`BackendAdapter`] is the command/telemetry contract every playback backend
//! implements. The orchestrator drives whichever backend is active through
//! this trait only.
//!
//! ## Command model
//!
//! Commands are **fire-and-forget**: they enqueue work on the backend's own
//! worker task and return immediately, so a slow native call never blocks the
//! thread that issued the command. Completion is observed through telemetry
//! (a `pause` property after `play()`, a `volume` property after
//! `set_volume()`, ...), never through a return value.
//!
//! Only [`get_stats`](BackendAdapter::get_stats) and
//! [`dispose`](BackendAdapter::dispose) are awaited, because their callers
//! need the result or the teardown to finish.
//!
//! ## Telemetry delivery
//!
//! | Backend | Delivery | Position source |
//! |---------|----------|-----------------|
//! | Primary | Polled every 250 ms, de-duplicated | `HardwarePlayer::sample` |
//! | Fallback | Pushed by the native decode loop | Observed properties |
//!
//! Both feed the same `PropertyBridge`; [`observe`](BackendAdapter::observe)
//! is the declarative subscription that works against either.

use crate::tracks::ExternalSubtitle;
use async_trait::async_trait;
use bridge_traits::PropertyFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat diagnostics mapping returned by `getStats`.
pub type StatsMap = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Backend identity
// ============================================================================

/// Which backend implementation is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hardware-accelerated, format-limited.
    Primary,
    /// Software decoding, used only after a primary format failure.
    Fallback,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Primary => "primary",
            BackendKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Command payloads
// ============================================================================

/// Parameters of an `open` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub uri: String,
    /// Extra HTTP headers for network sources. Ordered so that backends
    /// receive them deterministically.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub start_position_ms: i64,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

fn default_autoplay() -> bool {
    true
}

impl OpenRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: BTreeMap::new(),
            start_position_ms: 0,
            autoplay: true,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_start_position_ms(mut self, position_ms: i64) -> Self {
        self.start_position_ms = position_ms.max(0);
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }
}

/// Subtitle choice. "No subtitle" is an explicit selection, not the absence
/// of one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubtitleSelection {
    None,
    Track(String),
}

impl SubtitleSelection {
    /// Parses a caller-supplied id; `None` and `"no"` mean no subtitle.
    pub fn from_id(id: Option<&str>) -> Self {
        match id {
            None | Some("no") | Some("") => SubtitleSelection::None,
            Some(id) => SubtitleSelection::Track(id.to_string()),
        }
    }

    /// Value of the `sid` property for this selection.
    pub fn as_sid(&self) -> &str {
        match self {
            SubtitleSelection::None => "no",
            SubtitleSelection::Track(id) => id,
        }
    }
}

/// Parameters of an `addSubtitleTrack` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSubtitleRequest {
    pub uri: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub select: bool,
}

impl AddSubtitleRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: None,
            language: None,
            mime_type: None,
            select: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn selected(mut self, select: bool) -> Self {
        self.select = select;
        self
    }
}

// ============================================================================
// BackendAdapter
// ============================================================================

/// Capability contract shared by the primary and fallback backends.
///
/// # Lifecycle
///
/// A backend is constructed by the orchestrator, receives commands until
/// [`dispose`](Self::dispose), and is never reused. Commands issued after
/// `dispose` are ignored.
///
/// # Units
///
/// Positions are milliseconds, volume is `0.0..=1.0`, rate is clamped to the
/// configured range.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn open(&self, request: &OpenRequest);

    fn play(&self);

    fn pause(&self);

    fn stop(&self);

    fn seek(&self, position_ms: i64);

    fn set_volume(&self, volume: f64);

    fn set_playback_rate(&self, rate: f64);

    fn select_audio_track(&self, id: &str);

    fn select_subtitle_track(&self, selection: &SubtitleSelection);

    /// `subtitle` is already registered with the session's `TrackRegistry`
    /// and carries its stable `ext_sub_N` id.
    fn add_subtitle_track(&self, subtitle: &ExternalSubtitle, select: bool);

    fn set_visible(&self, visible: bool);

    /// Start delivering `name` through the property bridge.
    fn observe(&self, name: &str, format: PropertyFormat);

    /// Backend diagnostics. Empty once disposed.
    async fn get_stats(&self) -> StatsMap;

    /// Release the native player. Idempotent, and safe on a backend whose
    /// native player never finished initializing.
    async fn dispose(&self);
}
