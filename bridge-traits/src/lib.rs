//! # Host Bridge Traits
//!
//! Capability contracts between the playback engine and the host platform.
//!
//! ## Overview
//!
//! The engine never talks to a decoder, the audio subsystem or the display
//! directly. Each of those is a trait in this crate that the host implements
//! on top of its native libraries, and that the engine receives through
//! `core_runtime::config::EngineConfig`.
//!
//! ## Traits
//!
//! ### Native players
//! - [`HardwarePlayer`](native::HardwarePlayer) / [`HardwarePlayerFactory`](native::HardwarePlayerFactory) - Hardware-accelerated, polled
//! - [`SoftwarePlayer`](native::SoftwarePlayer) / [`SoftwarePlayerFactory`](native::SoftwarePlayerFactory) - Software decoding, push-based
//!
//! ### OS services
//! - [`AudioFocusService`](audio::AudioFocusService) - Exclusive media audio output
//! - [`DisplayService`](display::DisplayService) - Refresh-rate options and frame-rate hints
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Capability | Desktop (`bridge-desktop`) | Mobile / TV |
//! |------------|----------------------------|-------------|
//! | Native players | Host supplied | Host supplied |
//! | Audio focus | Always-granted shim | Platform adapter |
//! | Display | Fixed-mode shim | Platform adapter |
//!
//! ## Callbacks
//!
//! OS and driver callbacks ([`FocusListener`](audio::FocusListener),
//! [`DisplayListener`](display::DisplayListener), the native event sinks) may
//! fire on any thread. The engine's callbacks only enqueue work and never
//! block, so hosts can invoke them directly from their callback threads.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Drivers report
//! playback failures as events carrying a
//! [`NativeErrorKind`](native::NativeErrorKind) rather than as `Err` values;
//! the engine classifies them.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`.

pub mod audio;
pub mod display;
pub mod error;
pub mod logging;
pub mod native;
pub mod playback;

pub use error::BridgeError;

pub use audio::{AudioFocusService, FocusChange, FocusListener, FocusRequest};
pub use display::{
    DisplayChange, DisplayListener, DisplayService, FrameRateStrategy, ListenerId,
    MatchContentPreference,
};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use native::{
    EndFileReason, HardwareEvent, HardwareEventSink, HardwarePlayer, HardwarePlayerFactory,
    HardwareState, HardwareStats, MediaItem, NativeErrorKind, NativeTrackGroup, NativeTrackKind,
    NativeValue, PlayerSample, PropertyFormat, SoftwareEvent, SoftwareEventSink, SoftwarePlayer,
    SoftwarePlayerFactory, SubtitleConfig,
};
pub use playback::PlaybackSessionId;
