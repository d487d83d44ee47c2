//! # Core Runtime Module
//!
//! Foundational infrastructure for the playback engine:
//! - Logging and tracing infrastructure
//! - Engine configuration and capability validation
//! - Telemetry message model and sinks
//!
//! ## Overview
//!
//! Every other engine crate depends on this one for its error conventions,
//! its logging setup and the message types the presentation layer consumes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ClientIdentity, EngineConfig, EngineConfigBuilder};
pub use error::{Error, Result};
pub use events::{ChannelSink, EngineMessage, MessageSink, PropertyValue};
