//! # Frame Rate Matcher
//!
//! Aligns the display refresh rate with the video frame rate.
//!
//! ## Policy
//!
//! - `fps <= 0` does nothing.
//! - Videos shorter than `short_video_threshold_ms` only ever get a seamless
//!   hint.
//! - Longer videos get a seamless hint when the display offers an exact or
//!   integer-multiple refresh rate. Otherwise a non-seamless hint is sent
//!   only if the platform preference allows it.
//!
//! Every accepted hint registers a one-shot display-change listener. When it
//! fires, the orchestrator waits `display_settle_delay_ms` before resuming,
//! since a mode change can be reported before the output is stable.

use bridge_traits::{DisplayListener, DisplayService, FrameRateStrategy, ListenerId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

const RATE_TOLERANCE: f32 = 0.01;

/// Outcome of [`FrameRateMatcher::set_video_frame_rate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRateDecision {
    /// Non-positive fps.
    Skipped,
    /// Seamless-only hint sent.
    Seamless,
    /// Non-seamless hint sent.
    NonSeamless,
    /// The display rejected the hint; playback continues unchanged.
    Unavailable,
}

impl FrameRateDecision {
    pub fn is_applied(&self) -> bool {
        matches!(self, FrameRateDecision::Seamless | FrameRateDecision::NonSeamless)
    }
}

/// Snapshot of the matcher state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameRateState {
    pub current_fps: f32,
    pub listener: Option<ListenerId>,
}

pub struct FrameRateMatcher {
    display: Arc<dyn DisplayService>,
    short_video_threshold_ms: i64,
    state: Mutex<FrameRateState>,
}

impl FrameRateMatcher {
    pub fn new(display: Arc<dyn DisplayService>, short_video_threshold_ms: i64) -> Self {
        Self {
            display,
            short_video_threshold_ms,
            state: Mutex::new(FrameRateState::default()),
        }
    }

    /// Sends a frame-rate hint for a video of `duration_ms` and, if accepted,
    /// registers `listener` for the next display change. A listener left from
    /// an earlier call is replaced.
    pub fn set_video_frame_rate(
        &self,
        fps: f32,
        duration_ms: i64,
        listener: DisplayListener,
    ) -> FrameRateDecision {
        if !(fps > 0.0) {
            return FrameRateDecision::Skipped;
        }

        let strategy = if duration_ms < self.short_video_threshold_ms {
            FrameRateStrategy::SeamlessOnly
        } else if self.has_matching_mode(fps) {
            FrameRateStrategy::SeamlessOnly
        } else if self.display.match_content_preference().allows_non_seamless() {
            FrameRateStrategy::Always
        } else {
            FrameRateStrategy::SeamlessOnly
        };

        let mut state = self.state.lock();
        if let Some(previous) = state.listener.take() {
            self.display.unregister_listener(previous);
        }

        if let Err(e) = self.display.set_frame_rate(fps, strategy) {
            warn!(fps, error = %e, "Display rejected frame rate hint");
            return FrameRateDecision::Unavailable;
        }
        state.current_fps = fps;

        match self.display.register_listener(listener) {
            Ok(id) => state.listener = Some(id),
            Err(e) => warn!(error = %e, "Display listener registration failed"),
        }

        debug!(fps, duration_ms, ?strategy, "Frame rate hint sent");
        match strategy {
            FrameRateStrategy::SeamlessOnly => FrameRateDecision::Seamless,
            FrameRateStrategy::Always => FrameRateDecision::NonSeamless,
        }
    }

    /// One-shot handling of a display change. Returns `true` if a listener
    /// was pending, i.e. the caller should start the settle delay.
    pub fn on_display_changed(&self) -> bool {
        let mut state = self.state.lock();
        match state.listener.take() {
            Some(id) => {
                self.display.unregister_listener(id);
                true
            }
            None => false,
        }
    }

    /// Clears the hint and any pending listener. Idempotent.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if let Some(id) = state.listener.take() {
            self.display.unregister_listener(id);
        }
        if state.current_fps > 0.0 {
            if let Err(e) = self.display.set_frame_rate(0.0, FrameRateStrategy::SeamlessOnly) {
                warn!(error = %e, "Failed to clear frame rate hint");
            }
        }
        state.current_fps = 0.0;
    }

    pub fn state(&self) -> FrameRateState {
        *self.state.lock()
    }

    fn has_matching_mode(&self, fps: f32) -> bool {
        let mut rates = self.display.alternative_refresh_rates();
        rates.push(self.display.current_refresh_rate());
        rates.into_iter().any(|rate| rate_matches(rate, fps))
    }
}

/// `true` when `rate` shows `fps` without pulldown: equal (to one decimal)
/// or an integer multiple.
fn rate_matches(rate: f32, fps: f32) -> bool {
    if rate <= 0.0 || fps <= 0.0 {
        return false;
    }
    if (rate - fps).abs() < RATE_TOLERANCE {
        return true;
    }
    if (rate * 10.0).floor() == (fps * 10.0).floor() {
        return true;
    }
    let ratio = rate / fps;
    ratio >= 1.0 && (ratio - ratio.round()).abs() < RATE_TOLERANCE
}
