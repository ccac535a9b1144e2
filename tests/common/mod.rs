//! Test doubles for driving a session controller without audio hardware

#![allow(dead_code)]

use murmur::audio::{AudioFormat, StreamHandlers, Transport, TransportProvider};
use murmur::pipeline::{
    AuthStatus, Credentials, EffectsPipeline, LatencyMode, PipelineConfig, PipelineFactory,
};
use murmur::{Result, SessionError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

// === Transport ===

#[derive(Default)]
struct TransportInner {
    handlers: Option<StreamHandlers>,
    log: Vec<String>,
    fail_start: bool,
}

/// Scripted transport: the test invokes the callbacks by hand
#[derive(Clone, Default)]
pub struct MockDriver {
    inner: Arc<Mutex<TransportInner>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> MockProvider {
        MockProvider {
            driver: self.clone(),
            fail_open: false,
        }
    }

    pub fn failing_provider(&self) -> MockProvider {
        MockProvider {
            driver: self.clone(),
            fail_open: true,
        }
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.inner.lock().fail_start = fail;
    }

    /// Deliver captured frames; returns false when capture is not running
    pub fn capture(&self, frames: &[i16]) -> bool {
        let mut inner = self.inner.lock();
        match inner.handlers.as_mut().and_then(|h| h.receive.as_mut()) {
            Some(handler) => {
                handler.on_receive(frames);
                true
            }
            None => false,
        }
    }

    /// Pull `frames` frames from the render handler, if render is running
    pub fn render(&self, frames: usize) -> Option<Vec<i16>> {
        let mut inner = self.inner.lock();
        let handler = inner.handlers.as_mut().and_then(|h| h.produce.as_mut())?;
        // Garbage in the buffer so zero-filling is observable
        let mut output = vec![i16::MIN; frames];
        handler.on_produce(&mut output);
        Some(output)
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().handlers.is_some()
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().log.clone()
    }

    pub fn starts(&self) -> usize {
        self.log().iter().filter(|e| e.starts_with("start")).count()
    }
}

pub struct MockProvider {
    driver: MockDriver,
    fail_open: bool,
}

impl TransportProvider for MockProvider {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn Transport>> {
        if self.fail_open {
            return Err(SessionError::DeviceUnavailable("no device".to_string()));
        }
        Ok(Box::new(MockTransport {
            driver: self.driver.clone(),
            format,
        }))
    }
}

struct MockTransport {
    driver: MockDriver,
    format: AudioFormat,
}

impl Transport for MockTransport {
    fn start(&mut self, handlers: StreamHandlers) -> Result<()> {
        let mut inner = self.driver.inner.lock();
        if inner.handlers.is_some() || handlers.is_empty() {
            return Ok(());
        }
        if inner.fail_start {
            return Err(SessionError::DeviceUnavailable("start failed".to_string()));
        }

        let kind = if handlers.receive.is_some() {
            "start duplex"
        } else {
            "start render"
        };
        inner.log.push(kind.to_string());
        inner.handlers = Some(handlers);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropped outside the lock; finalizing a sink may take a moment
        let handlers = {
            let mut inner = self.driver.inner.lock();
            if inner.handlers.is_some() {
                inner.log.push("stop".to_string());
            }
            inner.handlers.take()
        };
        drop(handlers);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.driver.is_active()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}

// === Effects engine ===

/// Calls observed by one pipeline
#[derive(Debug, Default)]
pub struct CallLog {
    pub calls: Vec<&'static str>,
    pub resets: usize,
    pub pushed: Vec<i16>,
    pub noise_suppression: bool,
    pub power: Option<f32>,
}

pub type SharedCallLog = Arc<Mutex<CallLog>>;

/// FIFO pipeline that holds back `latency` frames until flushed
pub struct ScriptedPipeline {
    queue: VecDeque<i16>,
    latency: usize,
    latency_mode: LatencyMode,
    log: SharedCallLog,
}

impl EffectsPipeline for ScriptedPipeline {
    fn process(&mut self, input: Option<&[i16]>, output: Option<&mut [i16]>) -> usize {
        let mut log = self.log.lock();
        log.calls.push("process");
        if let Some(input) = input {
            self.queue.extend(input.iter().copied());
            log.pushed.extend_from_slice(input);
        }

        let Some(output) = output else {
            return 0;
        };
        let available = self.queue.len().saturating_sub(self.latency);
        let n = available.min(output.len());
        for slot in output[..n].iter_mut() {
            *slot = self.queue.pop_front().unwrap_or(0);
        }
        n
    }

    fn flush(&mut self, output: Option<&mut [i16]>) -> usize {
        let mut log = self.log.lock();
        let Some(output) = output else {
            log.calls.push("reset");
            log.resets += 1;
            self.queue.clear();
            return 0;
        };

        log.calls.push("flush");
        let n = self.queue.len().min(output.len());
        for slot in output[..n].iter_mut() {
            *slot = self.queue.pop_front().unwrap_or(0);
        }
        if n < output.len() {
            self.queue.clear();
        }
        n
    }

    fn set_noise_suppression(&mut self, enabled: bool) {
        self.log.lock().noise_suppression = enabled;
    }

    fn noise_suppression_enabled(&self) -> bool {
        self.log.lock().noise_suppression
    }

    fn set_noise_suppression_power(&mut self, power: f32) {
        self.log.lock().power = Some(power);
    }

    fn latency_mode(&self) -> LatencyMode {
        self.latency_mode
    }
}

/// Factory with a scripted license answer and allocation outcome
#[derive(Clone)]
pub struct ScriptedFactory {
    pub status: Arc<Mutex<Result<AuthStatus>>>,
    pub fail_allocation: Arc<Mutex<bool>>,
    /// Frames the file pipeline holds back
    pub file_latency: usize,
    pub monitor: SharedCallLog,
    pub file: SharedCallLog,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(Ok(AuthStatus::Active))),
            fail_allocation: Arc::new(Mutex::new(false)),
            file_latency: 0,
            monitor: SharedCallLog::default(),
            file: SharedCallLog::default(),
        }
    }

    pub fn with_file_latency(mut self, frames: usize) -> Self {
        self.file_latency = frames;
        self
    }

    pub fn set_status(&self, status: Result<AuthStatus>) {
        *self.status.lock() = status;
    }
}

impl PipelineFactory for ScriptedFactory {
    fn authorize(&self, _credentials: &Credentials) -> Result<AuthStatus> {
        self.status.lock().clone()
    }

    fn new_pipeline(&self, config: &PipelineConfig) -> Result<Box<dyn EffectsPipeline>> {
        if *self.fail_allocation.lock() {
            return Err(SessionError::PipelineAllocationFailed(
                "out of memory".to_string(),
            ));
        }

        let (log, latency) = match config.latency_mode {
            LatencyMode::Playback => (self.monitor.clone(), 0),
            _ => (self.file.clone(), self.file_latency),
        };
        Ok(Box::new(ScriptedPipeline {
            queue: VecDeque::new(),
            latency,
            latency_mode: config.latency_mode,
            log,
        }))
    }
}

/// Ramp of `len` distinct frames starting at `start`
pub fn ramp(start: i16, len: usize) -> Vec<i16> {
    (0..len).map(|i| start.wrapping_add(i as i16)).collect()
}
