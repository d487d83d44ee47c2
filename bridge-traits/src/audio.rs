//! Audio focus capability.
//!
//! The host OS grants exclusive "media" audio output to one application at a
//! time. The engine asks for it through [`AudioFocusService`] and learns about
//! later changes through the listener it hands over with the request.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Focus transitions reported by the OS after a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusChange {
    /// Focus (re)granted.
    Gain,
    /// Another application took focus for an unbounded time.
    Loss,
    /// Focus lost briefly (e.g. a phone call or navigation prompt).
    LossTransient,
    /// Focus lost briefly, but quieter playback may continue.
    LossTransientCanDuck,
}

impl FocusChange {
    /// `true` for the losses that require playback to pause.
    pub fn pauses_playback(&self) -> bool {
        matches!(self, FocusChange::Loss | FocusChange::LossTransient)
    }
}

/// Callback invoked by the host for every [`FocusChange`].
///
/// May be called from any OS thread. The engine's implementation only enqueues
/// and never blocks.
pub type FocusListener = Arc<dyn Fn(FocusChange) + Send + Sync>;

/// How the engine intends to use the audio output. Hosts map this onto their
/// native attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusRequest {
    pub usage: AudioUsage,
    pub content: AudioContentType,
}

impl Default for FocusRequest {
    fn default() -> Self {
        Self {
            usage: AudioUsage::Media,
            content: AudioContentType::Movie,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioUsage {
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioContentType {
    Movie,
    Music,
}

impl fmt::Display for FocusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FocusChange::Gain => "gain",
            FocusChange::Loss => "loss",
            FocusChange::LossTransient => "loss-transient",
            FocusChange::LossTransientCanDuck => "loss-transient-can-duck",
        };
        f.write_str(name)
    }
}

/// Host audio-focus service.
///
/// Calls are synchronous so that `dispose` can unregister the listener before
/// returning. Implementations must not invoke the listener from inside
/// `request_focus` or `abandon_focus`.
pub trait AudioFocusService: Send + Sync {
    /// Requests exclusive focus. Returns whether the OS granted it. The
    /// listener stays registered until [`abandon_focus`](Self::abandon_focus),
    /// whether or not focus was granted.
    fn request_focus(&self, request: FocusRequest, listener: FocusListener) -> Result<bool>;

    /// Releases focus and drops the registered listener. Must succeed when no
    /// request was ever made.
    fn abandon_focus(&self) -> Result<()>;
}
