//! Native player drivers.
//!
//! The engine drives two structurally different native players:
//!
//! - [`HardwarePlayer`]: a hardware-accelerated pipeline with an imperative
//!   API. It reports state transitions and errors through a
//!   [`HardwareEventSink`] and is otherwise *polled* for position, buffer and
//!   frame counters.
//! - [`SoftwarePlayer`]: a software decoder driven by named options,
//!   properties and string commands. It *pushes* property changes and
//!   discrete events through a [`SoftwareEventSink`] from its own decode loop.
//!
//! Hosts implement these traits (and their factories) on top of the platform
//! libraries. Every method may block on native I/O, so all of them are async;
//! the engine never awaits them on the caller's thread.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Native classification of a playback error, as reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NativeErrorKind {
    /// Decoder failed while decoding samples of an unsupported format.
    DecodingFailed,
    /// No decoder could be instantiated for the stream.
    DecoderInitFailed,
    /// Querying decoders for the stream's format failed.
    DecoderQueryFailed,
    /// Stream exceeds the decoder's declared capabilities (profile, level,
    /// resolution).
    ExceedsCapabilities,
    /// Player could not be created or initialized.
    InitFailed,
    /// I/O or network failure while loading.
    Network,
    /// Malformed data unrelated to format support.
    CorruptStream,
    Other,
}

// ============================================================================
// Hardware player
// ============================================================================

/// Lifecycle state of the hardware player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Events raised by a [`HardwarePlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    StateChanged(HardwareState),
    IsPlayingChanged(bool),
    TracksChanged,
    /// A new media item became current (after `prepare`).
    MediaItemTransition,
    Error {
        kind: NativeErrorKind,
        message: String,
    },
}

/// Callback a hardware driver uses to report [`HardwareEvent`]s. Never blocks.
pub type HardwareEventSink = Arc<dyn Fn(HardwareEvent) + Send + Sync>;

/// Sideloaded subtitle attached to a [`MediaItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleConfig {
    pub uri: String,
    pub mime_type: String,
    pub language: Option<String>,
    pub label: Option<String>,
    /// Select this subtitle once the item is prepared.
    pub selected: bool,
}

/// Media handed to [`HardwarePlayer::prepare`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub subtitles: Vec<SubtitleConfig>,
}

impl MediaItem {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_subtitles(mut self, subtitles: Vec<SubtitleConfig>) -> Self {
        self.subtitles = subtitles;
        self
    }
}

/// One poll of the hardware player's clock and counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSample {
    pub position_ms: i64,
    /// `None` while the duration is unknown.
    pub duration_ms: Option<i64>,
    pub buffered_position_ms: i64,
    pub is_playing: bool,
    /// Frames rendered since the current item was prepared.
    pub rendered_frames: u64,
    /// Whether a video track is currently selected.
    pub video_selected: bool,
}

/// Track category as seen by the hardware player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeTrackKind {
    Audio,
    Video,
    Text,
}

/// A group of tracks exposed by the hardware player. The group's position in
/// the list returned by [`HardwarePlayer::track_groups`] (counted per kind)
/// is its index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeTrackGroup {
    pub kind: Option<NativeTrackKind>,
    pub label: Option<String>,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub is_default: bool,
    pub selected: bool,
    /// Set when the group is a sideloaded subtitle (its URI).
    pub external_uri: Option<String>,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
}

/// Diagnostics reported by the hardware player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareStats {
    pub video_codec: Option<String>,
    pub video_mime_type: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub video_fps: Option<f32>,
    pub video_bitrate: Option<u64>,
    pub video_decoder_name: Option<String>,
    pub dropped_frames: Option<u64>,
    pub rendered_frames: Option<u64>,
    pub audio_codec: Option<String>,
    pub audio_mime_type: Option<String>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub audio_bitrate: Option<u64>,
}

/// Hardware-accelerated native player.
#[async_trait]
pub trait HardwarePlayer: Send + Sync {
    /// Load `item` and seek to `start_ms`. Starts playing once ready when
    /// `play_when_ready` is set.
    async fn prepare(&self, item: MediaItem, start_ms: i64, play_when_ready: bool) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn seek_to(&self, position_ms: i64) -> Result<()>;

    /// Volume in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn set_speed(&self, speed: f32) -> Result<()>;

    async fn sample(&self) -> Result<PlayerSample>;

    async fn track_groups(&self) -> Result<Vec<NativeTrackGroup>>;

    /// Select the `index`-th group of `kind`, overriding automatic selection.
    async fn select_track(&self, kind: NativeTrackKind, index: usize) -> Result<()>;

    /// Disable every track of `kind`.
    async fn disable_tracks(&self, kind: NativeTrackKind) -> Result<()>;

    async fn set_visible(&self, visible: bool) -> Result<()>;

    async fn stats(&self) -> Result<HardwareStats>;

    /// Free the native player. No other call follows.
    async fn release(&self) -> Result<()>;
}

/// Creates [`HardwarePlayer`]s bound to the host's video surface.
#[async_trait]
pub trait HardwarePlayerFactory: Send + Sync {
    async fn create(&self, events: HardwareEventSink) -> Result<Arc<dyn HardwarePlayer>>;
}

// ============================================================================
// Software player
// ============================================================================

/// Value format requested when observing a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyFormat {
    Double,
    Flag,
    String,
    Node,
}

/// Property value pushed by a [`SoftwarePlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Property currently unavailable.
    None,
    Double(f64),
    Flag(bool),
    String(String),
    Node(serde_json::Value),
}

/// Why the software player ended the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndFileReason {
    Eof,
    Stop,
    Quit,
    Error,
    Redirect,
}

/// Events raised by a [`SoftwarePlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum SoftwareEvent {
    PropertyChange {
        name: String,
        value: NativeValue,
    },
    FileLoaded,
    PlaybackRestart,
    EndFile {
        reason: EndFileReason,
        error: Option<String>,
    },
    LogMessage {
        prefix: String,
        level: String,
        text: String,
    },
    Shutdown,
}

/// Callback a software driver uses to report [`SoftwareEvent`]s. Never blocks.
pub type SoftwareEventSink = Arc<dyn Fn(SoftwareEvent) + Send + Sync>;

/// Software-decoding native player addressed by option/property names.
#[async_trait]
pub trait SoftwarePlayer: Send + Sync {
    /// Set an option before [`initialize`](Self::initialize).
    async fn set_option(&self, name: &str, value: &str) -> Result<()>;

    async fn initialize(&self) -> Result<()>;

    /// Start pushing changes of `name` as [`SoftwareEvent::PropertyChange`].
    async fn observe_property(&self, name: &str, format: PropertyFormat) -> Result<()>;

    async fn set_property(&self, name: &str, value: &str) -> Result<()>;

    /// `None` when the property is unavailable.
    async fn get_property(&self, name: &str) -> Result<Option<String>>;

    async fn command(&self, args: &[String]) -> Result<()>;

    async fn set_visible(&self, visible: bool) -> Result<()>;

    /// Tear down the native context. No other call follows.
    async fn destroy(&self) -> Result<()>;
}

/// Creates [`SoftwarePlayer`]s bound to the host's video surface.
#[async_trait]
pub trait SoftwarePlayerFactory: Send + Sync {
    async fn create(&self, events: SoftwareEventSink) -> Result<Arc<dyn SoftwarePlayer>>;
}
