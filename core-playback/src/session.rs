//! Playback session model.
//!
//! A [`PlaybackSession`] exists from `open` until `stop`, the next `open`, or
//! `dispose`. It records what was asked for (the media and its start
//! position) and the persistent intent issued since (volume, rate,
//! visibility, track choice), which is what the orchestrator re-applies to
//! the fallback backend after a swap.

use crate::traits::{BackendKind, OpenRequest, SubtitleSelection};
use bridge_traits::PlaybackSessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    PrimaryActive,
    SwitchingToFallback,
    FallbackActive,
    Disposed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::PrimaryActive => "primary-active",
            SessionState::SwitchingToFallback => "switching-to-fallback",
            SessionState::FallbackActive => "fallback-active",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Persistent intent issued during a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionIntent {
    pub volume: Option<f64>,
    pub rate: Option<f64>,
    pub visible: Option<bool>,
    pub paused: Option<bool>,
    pub audio_track: Option<String>,
    pub subtitle: Option<SubtitleSelection>,
}

/// One open media item.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: PlaybackSessionId,
    pub request: OpenRequest,
    pub backend: BackendKind,
    /// Incremented for every backend the session installs. Failures carry
    /// the epoch of the backend that raised them.
    pub epoch: u64,
    pub intent: SessionIntent,
}

impl PlaybackSession {
    pub fn new(request: OpenRequest, epoch: u64) -> Self {
        Self {
            id: PlaybackSessionId::new(),
            request,
            backend: BackendKind::Primary,
            epoch,
            intent: SessionIntent::default(),
        }
    }

    /// Whether the session may still swap to the fallback backend.
    pub fn can_fall_back(&self) -> bool {
        self.backend == BackendKind::Primary && !self.request.uri.is_empty()
    }

    /// Open request for the fallback, resuming at `position_ms`. Without a
    /// position sample the original start position is used.
    pub fn resume_request(&self, position_ms: Option<i64>, paused: bool) -> OpenRequest {
        let start = position_ms.unwrap_or(self.request.start_position_ms);
        self.request
            .clone()
            .with_start_position_ms(start)
            .with_autoplay(!paused)
    }
}
