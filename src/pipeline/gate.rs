//! Built-in effects engine: block noise gate behind a latency FIFO
//!
//! Stands in for a vendor noise-suppression engine so the session controller
//! can run end to end. Latency is modeled by priming the FIFO with silence on
//! the first push after a reset.

use super::{
    AuthStatus, Credentials, EffectsPipeline, LatencyMode, PipelineConfig, PipelineFactory,
};
use crate::audio::{AudioFormat, FrameRingBuffer};
use crate::{Result, SessionError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Frames analysed together when deciding whether to gate
const GATE_BLOCK: usize = 256;

/// Gate threshold at full power, as a fraction of full scale RMS
const MAX_THRESHOLD: f32 = 0.05;

const DEFAULT_POWER: f32 = 0.5;

pub struct GatePipeline {
    latency_mode: LatencyMode,
    latency_frames: usize,
    fifo: FrameRingBuffer,
    primed: bool,
    noise_suppression: bool,
    power: f32,
}

impl GatePipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        let latency_frames = latency_frames(config.latency_mode, config.format);
        // One second of headroom on top of the latency reserve
        let capacity = latency_frames + config.format.sample_rate as usize;

        Self {
            latency_mode: config.latency_mode,
            latency_frames,
            fifo: FrameRingBuffer::new(capacity),
            primed: false,
            noise_suppression: false,
            power: DEFAULT_POWER,
        }
    }

    /// Frames of silence emitted ahead of the first input after a reset
    pub fn latency_frames(&self) -> usize {
        self.latency_frames
    }

    /// Frames currently buffered
    pub fn buffered_frames(&self) -> usize {
        self.fifo.len()
    }

    fn push(&mut self, input: &[i16]) {
        if !self.primed {
            let silence = [0i16; GATE_BLOCK];
            let mut remaining = self.latency_frames;
            while remaining > 0 {
                let n = remaining.min(GATE_BLOCK);
                self.fifo.push(&silence[..n]);
                remaining -= n;
            }
            self.primed = true;
        }

        let threshold = self.threshold();
        let mut block = [0i16; GATE_BLOCK];
        let mut evicted = 0;

        for chunk in input.chunks(GATE_BLOCK) {
            let gated = self.noise_suppression && rms(chunk) < threshold;
            let staged = &mut block[..chunk.len()];
            if gated {
                staged.fill(0);
            } else {
                staged.copy_from_slice(chunk);
            }
            evicted += self.fifo.push(staged);
        }

        if evicted > 0 {
            debug!("Gate pipeline overflow, dropped {} frames", evicted);
        }
    }

    fn threshold(&self) -> f32 {
        self.power * MAX_THRESHOLD * i16::MAX as f32
    }

    fn clear(&mut self) {
        self.fifo.clear();
        self.primed = false;
    }
}

impl EffectsPipeline for GatePipeline {
    fn process(&mut self, input: Option<&[i16]>, output: Option<&mut [i16]>) -> usize {
        if let Some(input) = input {
            self.push(input);
        }
        match output {
            Some(output) => self.fifo.pop_into(output),
            None => 0,
        }
    }

    fn flush(&mut self, output: Option<&mut [i16]>) -> usize {
        let Some(output) = output else {
            self.clear();
            return 0;
        };

        let drained = self.fifo.pop_into(output);
        if drained < output.len() {
            self.clear();
        }
        drained
    }

    fn set_noise_suppression(&mut self, enabled: bool) {
        self.noise_suppression = enabled;
    }

    fn noise_suppression_enabled(&self) -> bool {
        self.noise_suppression
    }

    fn set_noise_suppression_power(&mut self, power: f32) {
        self.power = power.clamp(0.0, 1.0);
    }

    fn latency_mode(&self) -> LatencyMode {
        self.latency_mode
    }
}

fn latency_frames(mode: LatencyMode, format: AudioFormat) -> usize {
    let rate = format.sample_rate as usize;
    match mode {
        LatencyMode::File => 0,
        // 10 ms
        LatencyMode::Streaming => rate / 100,
        // 200 ms
        LatencyMode::Playback => rate / 5,
    }
}

fn rms(frames: &[i16]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let sum: f64 = frames.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / frames.len() as f64).sqrt() as f32
}

/// Factory for [`GatePipeline`]s
///
/// Accepts any non-empty credential. Pipelines can only be created after a
/// successful authorization.
#[derive(Debug, Default)]
pub struct GateFactory {
    authorized: AtomicBool,
}

impl GateFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineFactory for GateFactory {
    fn authorize(&self, credentials: &Credentials) -> Result<AuthStatus> {
        let secret = match credentials {
            Credentials::CustomerId(id) => id,
            Credentials::Key(key) => key,
        };

        let status = if secret.trim().is_empty() {
            AuthStatus::Inactive
        } else {
            AuthStatus::Active
        };

        info!("Gate engine authorization: {}", status);
        self.authorized.store(status.is_active(), Ordering::SeqCst);
        Ok(status)
    }

    fn new_pipeline(&self, config: &PipelineConfig) -> Result<Box<dyn EffectsPipeline>> {
        if !self.authorized.load(Ordering::SeqCst) {
            warn!("Pipeline requested before authorization");
            return Err(SessionError::PipelineAllocationFailed(
                "engine not authorized".to_string(),
            ));
        }
        if config.format.channels != 1 || config.format.bits_per_sample != 16 {
            return Err(SessionError::PipelineAllocationFailed(format!(
                "unsupported format: {} channels, {} bits",
                config.format.channels, config.format.bits_per_sample
            )));
        }

        debug!("Created gate pipeline ({:?})", config.latency_mode);
        Ok(Box::new(GatePipeline::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: LatencyMode) -> PipelineConfig {
        PipelineConfig::new(AudioFormat::mono_i16(48_000)).with_latency_mode(mode)
    }

    #[test]
    fn test_file_mode_passes_through() {
        let mut pipeline = GatePipeline::new(&config(LatencyMode::File));
        let input: Vec<i16> = (0..512).map(|i| i as i16).collect();
        let mut output = vec![0i16; 512];

        assert_eq!(pipeline.process(Some(&input), Some(&mut output)), 512);
        assert_eq!(output, input);
        assert_eq!(pipeline.flush(Some(&mut output)), 0);
    }

    #[test]
    fn test_streaming_delays_then_flushes_tail() {
        let mut pipeline = GatePipeline::new(&config(LatencyMode::Streaming));
        assert_eq!(pipeline.latency_frames(), 480);

        let input = vec![1000i16; 512];
        let mut output = vec![7i16; 512];
        assert_eq!(pipeline.process(Some(&input), Some(&mut output)), 512);
        assert!(output[..480].iter().all(|&s| s == 0));
        assert!(output[480..].iter().all(|&s| s == 1000));

        // The latency reserve comes back out on flush
        let mut tail = vec![0i16; 512];
        assert_eq!(pipeline.flush(Some(&mut tail)), 480);
        assert_eq!(pipeline.buffered_frames(), 0);

        // Drained and reset: nothing left
        assert_eq!(pipeline.flush(Some(&mut tail)), 0);
    }

    #[test]
    fn test_push_then_pull_separately() {
        let mut pipeline = GatePipeline::new(&config(LatencyMode::Playback));
        let mut output = vec![0i16; 256];

        // Nothing pushed yet
        assert_eq!(pipeline.process(None, Some(&mut output)), 0);

        pipeline.process(Some(&[500i16; 256]), None);
        assert_eq!(pipeline.buffered_frames(), 9600 + 256);
        assert_eq!(pipeline.process(None, Some(&mut output)), 256);
    }

    #[test]
    fn test_reset_discards_buffer() {
        let mut pipeline = GatePipeline::new(&config(LatencyMode::Streaming));
        pipeline.process(Some(&[1i16; 100]), None);
        pipeline.reset();
        assert_eq!(pipeline.buffered_frames(), 0);
    }

    #[test]
    fn test_gate_silences_quiet_blocks() {
        let mut pipeline = GatePipeline::new(&config(LatencyMode::File));
        pipeline.set_noise_suppression(true);
        assert!(pipeline.noise_suppression_enabled());

        let mut input = vec![10i16; GATE_BLOCK];
        input.extend(vec![20_000i16; GATE_BLOCK]);
        let mut output = vec![0i16; input.len()];

        assert_eq!(pipeline.process(Some(&input), Some(&mut output)), input.len());
        assert!(output[..GATE_BLOCK].iter().all(|&s| s == 0));
        assert!(output[GATE_BLOCK..].iter().all(|&s| s == 20_000));
    }

    #[test]
    fn test_zero_power_disables_gate() {
        let mut pipeline = GatePipeline::new(&config(LatencyMode::File));
        pipeline.set_noise_suppression(true);
        pipeline.set_noise_suppression_power(0.0);

        let input = vec![10i16; GATE_BLOCK];
        let mut output = vec![0i16; GATE_BLOCK];
        pipeline.process(Some(&input), Some(&mut output));
        assert_eq!(output, input);
    }

    #[test]
    fn test_factory_requires_authorization() {
        let factory = GateFactory::new();
        let cfg = config(LatencyMode::Streaming);
        assert!(factory.new_pipeline(&cfg).is_err());

        let status = factory
            .authorize(&Credentials::CustomerId(" ".to_string()))
            .unwrap();
        assert_eq!(status, AuthStatus::Inactive);
        assert!(factory.new_pipeline(&cfg).is_err());

        let status = factory.authorize(&Credentials::Key("k".to_string())).unwrap();
        assert!(status.is_active());
        let pipeline = factory.new_pipeline(&cfg).unwrap();
        assert_eq!(pipeline.latency_mode(), LatencyMode::Streaming);
    }
}
