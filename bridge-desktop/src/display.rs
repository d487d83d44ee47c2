//! Display shim

use bridge_traits::{
    display::{
        DisplayChange, DisplayListener, DisplayService, FrameRateStrategy, ListenerId,
        MatchContentPreference,
    },
    error::Result,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

/// Desktop display with a single fixed mode.
///
/// There are no alternative refresh rates and non-seamless switching is not
/// allowed, so every hint the engine sends is effectively advisory. Hints
/// are recorded and can be inspected with [`last_hint`](Self::last_hint).
pub struct DesktopDisplay {
    refresh_rate: f32,
    state: Mutex<DisplayState>,
}

#[derive(Default)]
struct DisplayState {
    next_id: u64,
    listeners: BTreeMap<ListenerId, DisplayListener>,
    last_hint: Option<(f32, FrameRateStrategy)>,
}

impl DesktopDisplay {
    pub fn new(refresh_rate: f32) -> Self {
        Self {
            refresh_rate,
            state: Mutex::new(DisplayState::default()),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn last_hint(&self) -> Option<(f32, FrameRateStrategy)> {
        self.state.lock().last_hint
    }

    /// Delivers a display change to every registered listener.
    pub fn notify(&self, refresh_rate: f32) {
        let listeners: Vec<DisplayListener> = self.state.lock().listeners.values().cloned().collect();
        let change = DisplayChange {
            display_id: 0,
            refresh_rate,
        };
        for listener in listeners {
            listener(change);
        }
    }
}

impl Default for DesktopDisplay {
    fn default() -> Self {
        Self::new(60.0)
    }
}

impl DisplayService for DesktopDisplay {
    fn current_refresh_rate(&self) -> f32 {
        self.refresh_rate
    }

    fn alternative_refresh_rates(&self) -> Vec<f32> {
        Vec::new()
    }

    fn match_content_preference(&self) -> MatchContentPreference {
        MatchContentPreference::SeamlessOnly
    }

    fn set_frame_rate(&self, fps: f32, strategy: FrameRateStrategy) -> Result<()> {
        debug!(fps, ?strategy, "Recording frame-rate hint");
        self.state.lock().last_hint = if fps > 0.0 { Some((fps, strategy)) } else { None };
        Ok(())
    }

    fn register_listener(&self, listener: DisplayListener) -> Result<ListenerId> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ListenerId(state.next_id);
        state.listeners.insert(id, listener);
        Ok(id)
    }

    fn unregister_listener(&self, id: ListenerId) {
        self.state.lock().listeners.remove(&id);
    }
}
