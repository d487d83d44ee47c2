use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgs(String),

    #[error("Player not initialized")]
    NotInitialized,

    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Method not implemented: {0}")]
    NotImplemented(String),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

impl ServiceError {
    /// Stable code reported to the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgs(_) => "INVALID_ARGS",
            ServiceError::NotInitialized => "NOT_INITIALIZED",
            ServiceError::InitFailed(_) => "INIT_FAILED",
            ServiceError::NotImplemented(_) => "NOT_IMPLEMENTED",
            ServiceError::Playback(e) if e.is_invalid_command() => "INVALID_ARGS",
            ServiceError::Playback(_) | ServiceError::Runtime(_) => "INTERNAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
