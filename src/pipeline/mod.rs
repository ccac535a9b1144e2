//! Effects pipeline contract
//!
//! The noise-suppression engine is opaque to the session controller. It is
//! reached through [`PipelineFactory`] (authorization + allocation) and
//! [`EffectsPipeline`] (push/pull processing and flushing).

pub mod gate;

use crate::audio::AudioFormat;
use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use gate::{GateFactory, GatePipeline};

/// How many frames a pipeline buffers before returning output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LatencyMode {
    /// Offline file processing, no added delay
    File,
    /// Balanced real-time I/O
    #[default]
    Streaming,
    /// Loopback playing, substantial buffering
    Playback,
}

/// Outcome of engine authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Authorization could not complete (e.g. no network)
    Error,
    /// The engine may be used
    Active,
    /// No license, or the license was revoked
    Inactive,
    Expired,
}

impl AuthStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AuthStatus::Active)
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStatus::Error => write!(f, "Error"),
            AuthStatus::Active => write!(f, "Active"),
            AuthStatus::Inactive => write!(f, "Inactive"),
            AuthStatus::Expired => write!(f, "Expired"),
        }
    }
}

/// Credentials presented to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Online authorization by customer id
    CustomerId(String),
    /// Offline authorization with a secret key
    Key(String),
}

/// Parameters fixed at pipeline creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub format: AudioFormat,
    pub latency_mode: LatencyMode,
}

impl PipelineConfig {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            latency_mode: LatencyMode::default(),
        }
    }

    pub fn with_latency_mode(mut self, latency_mode: LatencyMode) -> Self {
        self.latency_mode = latency_mode;
        self
    }
}

/// A stateful per-direction filter
pub trait EffectsPipeline: Send {
    /// Push `input` frames and/or pull processed frames into `output`
    ///
    /// Returns the number of frames written to `output`, which may be fewer
    /// than its length while the pipeline is buffering.
    fn process(&mut self, input: Option<&[i16]>, output: Option<&mut [i16]>) -> usize;

    /// Drain internally buffered frames into `output`
    ///
    /// A return value below `output.len()` means the pipeline is drained and
    /// its state was reset. `None` discards everything and resets.
    fn flush(&mut self, output: Option<&mut [i16]>) -> usize;

    /// Reset to an empty state without retrieving frames
    fn reset(&mut self) {
        self.flush(None);
    }

    fn set_noise_suppression(&mut self, enabled: bool);

    fn noise_suppression_enabled(&self) -> bool;

    /// Filtering strength in `0.0..=1.0`
    fn set_noise_suppression_power(&mut self, power: f32);

    fn latency_mode(&self) -> LatencyMode;
}

/// Entry point of the effects engine
pub trait PipelineFactory: Send {
    /// Check the license; must report [`AuthStatus::Active`] before pipelines can be created
    fn authorize(&self, credentials: &Credentials) -> Result<AuthStatus>;

    fn new_pipeline(&self, config: &PipelineConfig) -> Result<Box<dyn EffectsPipeline>>;
}

/// A pipeline reachable from both real-time contexts and the control context
pub type SharedPipeline = Arc<Mutex<Box<dyn EffectsPipeline>>>;

pub fn share(pipeline: Box<dyn EffectsPipeline>) -> SharedPipeline {
    Arc::new(Mutex::new(pipeline))
}
