//! Workspace façade crate.
//!
//! Re-exports the playback engine and, with the default `desktop-shims`
//! feature, the method-call service wired to the desktop host shims. Hosts
//! can depend on `playback-engine-workspace` instead of wiring each crate.

pub use core_playback as playback;

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
