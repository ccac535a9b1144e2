//! Session configuration
//!
//! Centralizes the audio format, engine credentials and buffer sizing used by
//! the session controller. Can be loaded from a TOML file.

use crate::audio::AudioFormat;
use crate::pipeline::Credentials;
use crate::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a session controller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sample rate shared by the transport, the files and both pipelines
    pub sample_rate: u32,

    /// Credentials presented to the effects engine during initialization
    pub credentials: Credentials,

    /// Directory new recordings are written into
    pub recordings_dir: PathBuf,

    /// Upper bound on frames per transport callback; staging buffers are pre-sized to it
    pub max_frames_per_callback: usize,

    /// Capacity of the real-time to control-context notice channel
    pub notice_capacity: usize,

    /// Capacity of the observer event channel
    pub event_capacity: usize,

    /// Initial noise suppression setting of the monitor pipeline
    pub playback_noise_suppression: bool,

    /// Filtering strength applied to both pipelines, in `0.0..=1.0`
    pub noise_suppression_power: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            credentials: Credentials::CustomerId("CUSTOMER_ID".to_string()),
            recordings_dir: std::env::temp_dir(),
            max_frames_per_callback: 4096,
            notice_capacity: 64,
            event_capacity: 64,
            playback_noise_suppression: false,
            noise_suppression_power: 0.5,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SessionError::ConfigError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SessionError::ConfigError(format!("Failed to read {:?}: {}", path.as_ref(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the engine credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the directory for new recordings
    pub fn with_recordings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recordings_dir = dir.into();
        self
    }

    /// Set the per-callback frame bound
    pub fn with_max_frames_per_callback(mut self, frames: usize) -> Self {
        self.max_frames_per_callback = frames;
        self
    }

    /// Set the filtering strength of both pipelines
    pub fn with_noise_suppression_power(mut self, power: f32) -> Self {
        self.noise_suppression_power = power;
        self
    }

    /// Audio format implied by this configuration
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::mono_i16(self.sample_rate)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SessionError::ConfigError(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.max_frames_per_callback == 0 {
            return Err(SessionError::ConfigError(
                "max_frames_per_callback must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.noise_suppression_power) {
            return Err(SessionError::ConfigError(format!(
                "noise_suppression_power must be within 0..=1, got {}",
                self.noise_suppression_power
            )));
        }
        if self.notice_capacity == 0 || self.event_capacity == 0 {
            return Err(SessionError::ConfigError(
                "channel capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
