//! # Track Registry
//!
//! Backend-independent identity for audio, video and subtitle tracks.
//!
//! ## Identity rules
//!
//! - **Embedded** tracks get `"{kind}_{index}"` (`audio_0`, `sub_2`,
//!   `video_0`), assigned on every discovery pass. An id is only guaranteed to
//!   mean the same track within one pass; callers re-read the selection from
//!   the next `track-list` instead of caching ids across passes.
//! - **External** subtitles get `"ext_sub_{n}"`, where `n` is the insertion
//!   index. These ids are owned by the registry, stay stable for the whole
//!   session and survive a backend swap: the orchestrator re-adds the
//!   external list to the new backend in insertion order.

use crate::traits::{AddSubtitleRequest, SubtitleSelection};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const EXTERNAL_PREFIX: &str = "ext_sub_";
const DEFAULT_EXTERNAL_TITLE: &str = "External";

/// Track category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Subtitle,
    Video,
}

impl TrackKind {
    /// Prefix used in track ids and in the `type` field of `track-list`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "sub",
            TrackKind::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(TrackKind::Audio),
            "sub" => Some(TrackKind::Subtitle),
            "video" => Some(TrackKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackOrigin {
    Embedded,
    External,
}

/// One entry of the `track-list` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub kind: TrackKind,
    pub title: Option<String>,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub origin: TrackOrigin,
    pub selected: bool,
    pub is_default: bool,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
    pub external_filename: Option<String>,
}

impl TrackDescriptor {
    /// Embedded track discovered at `index` among tracks of its kind.
    pub fn embedded(kind: TrackKind, index: usize) -> Self {
        Self {
            id: embedded_id(kind, index),
            kind,
            title: None,
            language: None,
            codec: None,
            origin: TrackOrigin::Embedded,
            selected: false,
            is_default: false,
            channel_count: None,
            sample_rate: None,
            external_filename: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_codec(mut self, codec: Option<String>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_audio_format(mut self, channel_count: Option<u32>, sample_rate: Option<u32>) -> Self {
        self.channel_count = channel_count;
        self.sample_rate = sample_rate;
        self
    }

    /// Wire form used inside the `track-list` property.
    pub fn to_node(&self) -> Value {
        let mut node = json!({
            "id": self.id,
            "type": self.kind.as_str(),
            "title": self.title,
            "lang": self.language,
            "codec": self.codec,
            "default": self.is_default,
            "selected": self.selected,
            "external": self.origin == TrackOrigin::External,
        });

        if let Some(map) = node.as_object_mut() {
            if let Some(channels) = self.channel_count {
                map.insert("demux-channel-count".to_string(), json!(channels));
            }
            if let Some(rate) = self.sample_rate {
                map.insert("demux-samplerate".to_string(), json!(rate));
            }
            if let Some(filename) = &self.external_filename {
                map.insert("external-filename".to_string(), json!(filename));
            }
        }
        node
    }
}

pub fn embedded_id(kind: TrackKind, index: usize) -> String {
    format!("{}_{}", kind.as_str(), index)
}

/// An external subtitle added during the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubtitle {
    /// `ext_sub_{index}`
    pub id: String,
    pub index: usize,
    pub uri: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub mime_type: String,
}

impl ExternalSubtitle {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_EXTERNAL_TITLE)
    }

    pub fn to_descriptor(&self, selected: bool) -> TrackDescriptor {
        TrackDescriptor {
            id: self.id.clone(),
            kind: TrackKind::Subtitle,
            title: Some(self.display_title().to_string()),
            language: self.language.clone(),
            codec: Some(self.mime_type.clone()),
            origin: TrackOrigin::External,
            selected,
            is_default: false,
            channel_count: None,
            sample_rate: None,
            external_filename: Some(self.uri.clone()),
        }
    }
}

/// Subtitle MIME type derived from the file extension, ignoring any query
/// string. Unknown extensions are treated as SubRip.
pub fn subtitle_mime_for(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri).to_lowercase();
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension {
        "ass" | "ssa" => "text/x-ssa",
        "vtt" => "text/vtt",
        "ttml" | "xml" | "dfxp" => "application/ttml+xml",
        _ => "application/x-subrip",
    }
}

/// Resolved meaning of a track id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRef {
    Embedded { kind: TrackKind, index: usize },
    External(ExternalSubtitle),
}

#[derive(Default)]
struct RegistryState {
    externals: Vec<ExternalSubtitle>,
    embedded: Vec<TrackDescriptor>,
    pass: u64,
    subtitle: Option<SubtitleSelection>,
}

/// Session-scoped track identity, shared by the orchestrator and the active
/// backend.
#[derive(Default)]
pub struct TrackRegistry {
    state: Mutex<RegistryState>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an external subtitle and assigns the next `ext_sub_N` id.
    pub fn add_external(&self, request: &AddSubtitleRequest) -> ExternalSubtitle {
        let mut state = self.state.lock();
        let index = state.externals.len();
        let subtitle = ExternalSubtitle {
            id: format!("{}{}", EXTERNAL_PREFIX, index),
            index,
            uri: request.uri.clone(),
            title: request.title.clone(),
            language: request.language.clone(),
            mime_type: request
                .mime_type
                .clone()
                .unwrap_or_else(|| subtitle_mime_for(&request.uri).to_string()),
        };
        state.externals.push(subtitle.clone());
        subtitle
    }

    /// External subtitles in insertion order.
    pub fn externals(&self) -> Vec<ExternalSubtitle> {
        self.state.lock().externals.clone()
    }

    pub fn external(&self, id: &str) -> Option<ExternalSubtitle> {
        self.state.lock().externals.iter().find(|s| s.id == id).cloned()
    }

    pub fn external_by_uri(&self, uri: &str) -> Option<ExternalSubtitle> {
        self.state.lock().externals.iter().find(|s| s.uri == uri).cloned()
    }

    /// Resolves a caller-supplied id. Embedded ids are parsed, not looked up,
    /// so an id from the current pass resolves even before the pass is
    /// recorded on this side.
    pub fn resolve(&self, id: &str) -> Option<TrackRef> {
        if let Some(rest) = id.strip_prefix(EXTERNAL_PREFIX) {
            rest.parse::<usize>().ok()?;
            return self.external(id).map(TrackRef::External);
        }

        let (kind, index) = id.rsplit_once('_')?;
        Some(TrackRef::Embedded {
            kind: TrackKind::parse(kind)?,
            index: index.parse().ok()?,
        })
    }

    /// Replaces the embedded tracks with a new discovery pass and returns the
    /// pass number.
    pub fn record_pass(&self, embedded: Vec<TrackDescriptor>) -> u64 {
        let mut state = self.state.lock();
        state.embedded = embedded;
        state.pass += 1;
        state.pass
    }

    pub fn pass(&self) -> u64 {
        self.state.lock().pass
    }

    /// Embedded tracks of the current pass followed by external subtitles.
    /// External entries are marked selected from the recorded subtitle
    /// selection.
    pub fn track_list(&self) -> Vec<TrackDescriptor> {
        let state = self.state.lock();
        let selected_external = match &state.subtitle {
            Some(SubtitleSelection::Track(id)) if id.starts_with(EXTERNAL_PREFIX) => Some(id.as_str()),
            _ => None,
        };

        let mut list = state.embedded.clone();
        if selected_external.is_some() {
            for track in list.iter_mut().filter(|t| t.kind == TrackKind::Subtitle) {
                track.selected = false;
            }
        }
        list.extend(
            state
                .externals
                .iter()
                .map(|s| s.to_descriptor(selected_external == Some(s.id.as_str()))),
        );
        list
    }

    pub fn track_list_node(&self) -> Value {
        Value::Array(self.track_list().iter().map(TrackDescriptor::to_node).collect())
    }

    pub fn set_subtitle_selection(&self, selection: SubtitleSelection) {
        self.state.lock().subtitle = Some(selection);
    }

    pub fn subtitle_selection(&self) -> Option<SubtitleSelection> {
        self.state.lock().subtitle.clone()
    }

    /// Forgets embedded tracks. Used when a new backend takes over and will
    /// re-discover them; external subtitles are kept.
    pub fn reset_embedded(&self) {
        let mut state = self.state.lock();
        state.embedded.clear();
        if !matches!(&state.subtitle, Some(SubtitleSelection::Track(id)) if id.starts_with(EXTERNAL_PREFIX))
        {
            state.subtitle = None;
        }
    }

    /// Forgets everything. Used when a new session starts.
    pub fn clear(&self) {
        *self.state.lock() = RegistryState::default();
    }
}
