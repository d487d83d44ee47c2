//! # Engine Configuration
//!
//! Collects the host capabilities the playback engine needs and the client
//! identity it reports.
//!
//! ## Overview
//!
//! The builder enforces fail-fast validation: every required capability must
//! be present before an engine can be constructed, and the error names the
//! missing one.
//!
//! ## Required Dependencies
//!
//! - `HardwarePlayerFactory` - Creates the primary (hardware) backend
//! - `SoftwarePlayerFactory` - Creates the fallback (software) backend
//! - `AudioFocusService` - Audio focus negotiation
//! - `DisplayService` - Refresh-rate matching
//! - `ClientIdentity` - Client/device identifiers
//!
//! When the `desktop-shims` feature is enabled, desktop defaults for
//! `AudioFocusService` and `DisplayService` are injected automatically if not
//! provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ClientIdentity, EngineConfig};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::builder()
//!     .identity(ClientIdentity::new("client-123", "Living Room TV", "android"))
//!     .hardware_factory(Arc::new(MyHardwareFactory))
//!     .software_factory(Arc::new(MySoftwareFactory))
//!     .audio_focus(Arc::new(MyFocusService))
//!     .display(Arc::new(MyDisplayService))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AudioFocusService, DisplayService, HardwarePlayerFactory, SoftwarePlayerFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifiers the host would otherwise keep in process-wide globals.
///
/// Passed explicitly into every session so that tests and multiple engines
/// in one process never share hidden state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    pub device_name: String,
    pub platform: String,
}

impl ClientIdentity {
    pub fn new(
        client_id: impl Into<String>,
        device_name: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            device_name: device_name.into(),
            platform: platform.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".to_string()));
        }
        if self.platform.trim().is_empty() {
            return Err(Error::Config("platform must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Engine configuration. Use [`EngineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct EngineConfig {
    pub identity: ClientIdentity,
    pub hardware_factory: Arc<dyn HardwarePlayerFactory>,
    pub software_factory: Arc<dyn SoftwarePlayerFactory>,
    pub audio_focus: Arc<dyn AudioFocusService>,
    pub display: Arc<dyn DisplayService>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("identity", &self.identity)
            .field("hardware_factory", &"HardwarePlayerFactory { ... }")
            .field("software_factory", &"SoftwarePlayerFactory { ... }")
            .field("audio_focus", &"AudioFocusService { ... }")
            .field("display", &"DisplayService { ... }")
            .finish()
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_audio_focus() -> Result<Arc<dyn AudioFocusService>> {
    Ok(Arc::new(bridge_desktop::DesktopAudioFocus::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_audio_focus() -> Result<Arc<dyn AudioFocusService>> {
    Err(capability_missing(
        "AudioFocusService",
        "No audio focus service provided. Desktop: enable the `desktop-shims` feature. \
         Mobile/TV: inject the platform adapter.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_display() -> Result<Arc<dyn DisplayService>> {
    Ok(Arc::new(bridge_desktop::DesktopDisplay::default()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_display() -> Result<Arc<dyn DisplayService>> {
    Err(capability_missing(
        "DisplayService",
        "No display service provided. Desktop: enable the `desktop-shims` feature. \
         Mobile/TV: inject the platform adapter.",
    ))
}

/// Builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineConfigBuilder {
    identity: Option<ClientIdentity>,
    hardware_factory: Option<Arc<dyn HardwarePlayerFactory>>,
    software_factory: Option<Arc<dyn SoftwarePlayerFactory>>,
    audio_focus: Option<Arc<dyn AudioFocusService>>,
    display: Option<Arc<dyn DisplayService>>,
}

impl EngineConfigBuilder {
    pub fn identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the factory for the hardware-accelerated primary backend (required).
    pub fn hardware_factory(mut self, factory: Arc<dyn HardwarePlayerFactory>) -> Self {
        self.hardware_factory = Some(factory);
        self
    }

    /// Sets the factory for the software fallback backend (required).
    pub fn software_factory(mut self, factory: Arc<dyn SoftwarePlayerFactory>) -> Self {
        self.software_factory = Some(factory);
        self
    }

    pub fn audio_focus(mut self, service: Arc<dyn AudioFocusService>) -> Self {
        self.audio_focus = Some(service);
        self
    }

    pub fn display(mut self, service: Arc<dyn DisplayService>) -> Self {
        self.display = Some(service);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required capability was not
    ///   provided and no desktop default applies
    /// - [`Error::Config`] when the client identity is missing or invalid
    pub fn build(self) -> Result<EngineConfig> {
        let identity = self
            .identity
            .ok_or_else(|| Error::Config("client identity is required".to_string()))?;
        identity.validate()?;

        let hardware_factory = self.hardware_factory.ok_or_else(|| {
            capability_missing(
                "HardwarePlayerFactory",
                "A hardware player factory is required for the primary backend.",
            )
        })?;
        let software_factory = self.software_factory.ok_or_else(|| {
            capability_missing(
                "SoftwarePlayerFactory",
                "A software player factory is required for the fallback backend.",
            )
        })?;

        let audio_focus = match self.audio_focus {
            Some(service) => service,
            None => provide_default_audio_focus()?,
        };
        let display = match self.display {
            Some(service) => service,
            None => provide_default_display()?,
        };

        Ok(EngineConfig {
            identity,
            hardware_factory,
            software_factory,
            audio_focus,
            display,
        })
    }
}
