//! # Desktop Bridge Implementations
//!
//! Default implementations of the host service traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! Desktop operating systems have no audio-focus arbitration and rarely let
//! applications change the display mode, so the shims here are deliberately
//! small:
//! - `AudioFocusService`: [`DesktopAudioFocus`] always grants focus
//! - `DisplayService`: [`DesktopDisplay`] reports a fixed mode and records hints
//!
//! Both keep their registered listeners and expose a `notify` method so a
//! host that does have platform hooks (e.g. a compositor refresh signal) can
//! forward them.
//!
//! Native players are not shimmed; hosts always supply their own factories.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopAudioFocus, DesktopDisplay};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::builder()
//!     .audio_focus(Arc::new(DesktopAudioFocus::new()))
//!     .display(Arc::new(DesktopDisplay::new(59.94)))
//!     // ...
//!     .build()?;
//! ```

mod display;
mod focus;

pub use display::DesktopDisplay;
pub use focus::DesktopAudioFocus;
