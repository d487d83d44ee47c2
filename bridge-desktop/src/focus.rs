//! Audio focus shim

use bridge_traits::{
    audio::{AudioFocusService, FocusChange, FocusListener, FocusRequest},
    error::Result,
};
use parking_lot::Mutex;
use tracing::debug;

/// Desktop audio focus: every request is granted immediately.
///
/// The listener from the latest request is kept until
/// [`abandon_focus`](AudioFocusService::abandon_focus) so that
/// [`notify`](Self::notify) can deliver host-originated changes.
#[derive(Default)]
pub struct DesktopAudioFocus {
    listener: Mutex<Option<FocusListener>>,
}

impl DesktopAudioFocus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a listener is currently registered.
    pub fn is_registered(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Forwards a focus change to the registered listener, if any. Returns
    /// whether a listener received it.
    pub fn notify(&self, change: FocusChange) -> bool {
        // Clone out so the listener runs without our lock held.
        let listener = self.listener.lock().clone();
        match listener {
            Some(listener) => {
                listener(change);
                true
            }
            None => false,
        }
    }
}

impl AudioFocusService for DesktopAudioFocus {
    fn request_focus(&self, request: FocusRequest, listener: FocusListener) -> Result<bool> {
        debug!(?request, "Granting desktop audio focus");
        *self.listener.lock() = Some(listener);
        Ok(true)
    }

    fn abandon_focus(&self) -> Result<()> {
        if self.listener.lock().take().is_some() {
            debug!("Desktop audio focus abandoned");
        }
        Ok(())
    }
}
