//! Murmur - record/playback session controller for a noise-suppression pipeline
//!
//! The crate sequences recording and playback sessions over a callback-driven
//! audio transport, streams frames to and from WAV files, and routes them
//! through an external effects pipeline.

pub mod audio;
pub mod config;
pub mod permission;
pub mod pipeline;
pub mod session;

use thiserror::Error;

pub use config::SessionConfig;
pub use session::{
    ControllerState, ErrorStatus, EventHub, PlaybackTarget, SessionCommand, SessionController,
    SessionEvent, SessionHandle, SessionMode, SessionPhase, SessionService, SessionState,
    SharedSessionState,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Record permission denied")]
    PermissionDenied,

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("File I/O failed: {0}")]
    FileIoFailed(String),

    #[error("Pipeline allocation failed: {0}")]
    PipelineAllocationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::FileIoFailed(e.to_string())
    }
}

impl From<hound::Error> for SessionError {
    fn from(e: hound::Error) -> Self {
        SessionError::FileIoFailed(e.to_string())
    }
}

impl SessionError {
    /// Check if the user can recover by re-invoking the operation
    ///
    /// Every session failure leaves the controller in a safe state, so the
    /// remedy is to retry once the cause (license, permission, device, disk)
    /// is addressed. Only configuration and internal channel failures need a
    /// restart.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::AuthorizationFailed(_)
            | SessionError::PermissionDenied
            | SessionError::DeviceUnavailable(_)
            | SessionError::FileIoFailed(_)
            | SessionError::PipelineAllocationFailed(_) => true,
            SessionError::ConfigError(_) | SessionError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            SessionError::AuthorizationFailed(_) => {
                "Effects engine authorization failed. Please check your license.".to_string()
            }
            SessionError::PermissionDenied => {
                "Microphone permission denied. Please allow access in settings.".to_string()
            }
            SessionError::DeviceUnavailable(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            SessionError::FileIoFailed(_) => "File system error occurred.".to_string(),
            SessionError::PipelineAllocationFailed(_) => {
                "Failed to create the effects pipeline. Please retry.".to_string()
            }
            SessionError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            SessionError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
