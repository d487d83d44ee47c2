//! # Playback Error Types
//!
//! Errors returned by engine commands, plus the classification of failures
//! reported asynchronously by a backend.

use bridge_traits::{BridgeError, NativeErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned synchronously by engine commands.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Command Errors
    // ========================================================================
    /// A required argument was missing or out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The command needs an open media item.
    #[error("No media open")]
    NoMedia,

    /// The engine was disposed; only a new engine can accept commands.
    #[error("Playback engine disposed")]
    Disposed,

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// A backend could not be constructed.
    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    /// Error surfaced by a native driver.
    #[error("Native backend error: {0}")]
    Native(#[from] BridgeError),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// The engine must be created inside a Tokio runtime.
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// `true` for errors caused by the caller's input.
    pub fn is_invalid_command(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidArgument(_) | PlaybackError::NoMedia | PlaybackError::Disposed
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

// ============================================================================
// Backend failure classification
// ============================================================================

/// How the orchestrator treats a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    /// The backend cannot play this format; recoverable by swapping to the
    /// fallback backend.
    FormatUnsupported,
    /// Surfaced once as `end-file{reason:"error"}`.
    Terminal,
}

/// A failure reported by a running backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub kind: NativeErrorKind,
    pub message: String,
}

impl BackendFailure {
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        if self.is_format_unsupported() {
            FailureClass::FormatUnsupported
        } else {
            FailureClass::Terminal
        }
    }

    /// Decoder could not handle the stream's format.
    pub fn is_format_unsupported(&self) -> bool {
        matches!(
            self.kind,
            NativeErrorKind::DecodingFailed
                | NativeErrorKind::DecoderInitFailed
                | NativeErrorKind::DecoderQueryFailed
                | NativeErrorKind::ExceedsCapabilities
        )
    }

    /// Caused by connectivity rather than content.
    pub fn is_network_error(&self) -> bool {
        matches!(self.kind, NativeErrorKind::Network)
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
