//! # Playback Engine Module
//!
//! Adaptive dual-backend playback: a hardware-accelerated primary backend,
//! a software fallback installed when the primary cannot play a format, and
//! the policies around them.
//!
//! ## Overview
//!
//! This module handles:
//! - The backend capability contract and both backend implementations
//! - The one-way primary → fallback swap at the last observed position
//! - One ordered, unit-normalized telemetry stream for the presentation layer
//! - Track identity that survives a swap (external subtitles keep `ext_sub_N`)
//! - Audio focus arbitration and display frame-rate matching
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{FallbackOrchestrator, OpenRequest, PlaybackConfig};
//! use core_runtime::events::ChannelSink;
//! use std::sync::Arc;
//!
//! let (sink, mut telemetry) = ChannelSink::new();
//! let engine = FallbackOrchestrator::new(engine_config, PlaybackConfig::default(), Arc::new(sink))?;
//!
//! engine.open(OpenRequest::new("https://cdn.example/film.mkv").with_start_position_ms(10_000)).await?;
//! while let Some(message) = telemetry.recv().await {
//!     println!("{}", message.to_json());
//! }
//! ```

pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod focus;
pub mod frame_rate;
pub mod orchestrator;
pub mod session;
pub mod tracks;
pub mod traits;

pub use backend::{ActiveBackend, BackendContext, FallbackBackend, PrimaryBackend};
pub use bridge::{BridgeEmitter, PropertyBridge, Subscription, DEFAULT_OBSERVED};
pub use config::PlaybackConfig;
pub use error::{BackendFailure, FailureClass, PlaybackError, Result};
pub use focus::{AudioFocusArbiter, FocusAction, FocusState};
pub use frame_rate::{FrameRateDecision, FrameRateMatcher, FrameRateState};
pub use orchestrator::{ControlMessage, FallbackOrchestrator};
pub use session::{PlaybackSession, SessionIntent, SessionState};
pub use tracks::{ExternalSubtitle, TrackDescriptor, TrackKind, TrackOrigin, TrackRegistry};
pub use traits::{
    AddSubtitleRequest, BackendAdapter, BackendKind, OpenRequest, StatsMap, SubtitleSelection,
};
