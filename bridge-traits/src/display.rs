//! Display refresh-rate capability.
//!
//! Hosts expose the display's refresh-rate options and accept a frame-rate
//! hint for the video surface. A hint with [`FrameRateStrategy::SeamlessOnly`]
//! must never produce a visible mode change.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// User/platform preference for matching content frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchContentPreference {
    /// Never change the display mode for content.
    Never,
    /// Only switches that do not interrupt the picture.
    SeamlessOnly,
    /// Non-seamless switches are allowed.
    Always,
}

impl MatchContentPreference {
    pub fn allows_non_seamless(&self) -> bool {
        matches!(self, MatchContentPreference::Always)
    }
}

/// Strategy attached to a frame-rate hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRateStrategy {
    SeamlessOnly,
    Always,
}

/// Change notification for the display hosting the video surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayChange {
    pub display_id: u32,
    pub refresh_rate: f32,
}

/// Handle returned by [`DisplayService::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Callback invoked on display changes, from any OS thread.
pub type DisplayListener = Arc<dyn Fn(DisplayChange) + Send + Sync>;

/// Host display service.
pub trait DisplayService: Send + Sync {
    /// Refresh rate of the current mode, in Hz.
    fn current_refresh_rate(&self) -> f32;

    /// Refresh rates the display can switch to without a visible glitch.
    fn alternative_refresh_rates(&self) -> Vec<f32>;

    /// The platform's setting for non-seamless content matching.
    fn match_content_preference(&self) -> MatchContentPreference;

    /// Attach a frame-rate hint to the video surface. `fps == 0.0` clears it.
    fn set_frame_rate(&self, fps: f32, strategy: FrameRateStrategy) -> Result<()>;

    fn register_listener(&self, listener: DisplayListener) -> Result<ListenerId>;

    /// Unknown ids are ignored.
    fn unregister_listener(&self, id: ListenerId);
}
