//! # Audio Focus Arbiter
//!
//! Negotiates exclusive media audio output with the host and decides how
//! playback reacts when another application takes it.
//!
//! | Change | Action | `was_playing_before_loss` |
//! |--------|--------|---------------------------|
//! | Loss / LossTransient | pause | set to "was playing" |
//! | LossTransientCanDuck | none | unchanged |
//! | Gain | resume if it was playing | cleared |
//!
//! The arbiter never touches a backend itself: it returns a [`FocusAction`]
//! that the orchestrator applies to whichever backend is active.

use bridge_traits::{AudioFocusService, FocusChange, FocusListener, FocusRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snapshot of the focus state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusState {
    pub held: bool,
    pub was_playing_before_loss: bool,
}

/// What the active backend should do after a focus change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusAction {
    Pause,
    Resume,
    None,
}

#[derive(Default)]
struct ArbiterState {
    focus: FocusState,
    /// A listener is registered with the host.
    registered: bool,
}

pub struct AudioFocusArbiter {
    service: Arc<dyn AudioFocusService>,
    state: Mutex<ArbiterState>,
}

impl AudioFocusArbiter {
    pub fn new(service: Arc<dyn AudioFocusService>) -> Self {
        Self {
            service,
            state: Mutex::new(ArbiterState::default()),
        }
    }

    /// Requests media focus. A host error counts as "not granted"; playback
    /// continues without focus.
    pub fn request(&self, listener: FocusListener) -> bool {
        let granted = match self.service.request_focus(FocusRequest::default(), listener) {
            Ok(granted) => granted,
            Err(e) => {
                warn!(error = %e, "Audio focus request failed");
                false
            }
        };

        let mut state = self.state.lock();
        state.registered = true;
        state.focus.held = granted;
        debug!(granted, "Audio focus requested");
        granted
    }

    /// Releases focus. Safe to call when focus was never held.
    pub fn abandon(&self) {
        let registered = {
            let mut state = self.state.lock();
            let registered = state.registered;
            *state = ArbiterState::default();
            registered
        };

        if registered {
            if let Err(e) = self.service.abandon_focus() {
                warn!(error = %e, "Audio focus abandon failed");
            }
        }
    }

    /// Applies a host focus change. `is_playing` is the playback state at the
    /// moment of the change.
    pub fn on_focus_change(&self, change: FocusChange, is_playing: bool) -> FocusAction {
        let mut state = self.state.lock();
        match change {
            FocusChange::Loss | FocusChange::LossTransient => {
                state.focus.held = false;
                state.focus.was_playing_before_loss = is_playing;
                FocusAction::Pause
            }
            FocusChange::LossTransientCanDuck => FocusAction::None,
            FocusChange::Gain => {
                state.focus.held = true;
                if state.focus.was_playing_before_loss {
                    state.focus.was_playing_before_loss = false;
                    FocusAction::Resume
                } else {
                    FocusAction::None
                }
            }
        }
    }

    pub fn state(&self) -> FocusState {
        self.state.lock().focus
    }
}
