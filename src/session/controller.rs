//! Record/playback session controller
//!
//! Arbitrates between idle, recording and playing modes. All transitions run
//! on the caller's context (the control context); real-time handlers report
//! back through [`ControlNotice`]s which are applied by
//! [`SessionController::process_notices`] or [`SessionController::handle_notice`].

use super::handlers::{
    CaptureHandler, ControlNotice, FileRenderHandler, MonitorFlags, MonitorRenderHandler,
    SharedMonitorFlags,
};
use super::state::{
    ControllerState, ErrorStatus, EventHub, PlaybackTarget, SessionEvent, SessionMode,
    SessionPhase, SessionState, SharedSessionState,
};
use crate::audio::{
    AudioFormat, SampleSink, SampleSource, StreamHandlers, Transport, TransportProvider,
};
use crate::config::SessionConfig;
use crate::permission::PermissionGate;
use crate::pipeline::{self, LatencyMode, PipelineConfig, PipelineFactory, SharedPipeline};
use crate::{Result, SessionError};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resources allocated by a successful initialization
struct Engine {
    transport: Box<dyn Transport>,
    /// Fed by the capture path, rendered during recording (monitor-through)
    monitor_pipeline: SharedPipeline,
    /// Filters files in playing sessions
    file_pipeline: SharedPipeline,
}

pub struct SessionController {
    config: SessionConfig,
    format: AudioFormat,
    factory: Box<dyn PipelineFactory>,
    transports: Box<dyn TransportProvider>,
    permission: Box<dyn PermissionGate>,
    engine: Option<Engine>,
    monitor_flags: SharedMonitorFlags,
    state: SharedSessionState,
    events: EventHub,
    notice_tx: Sender<ControlNotice>,
    notice_rx: Receiver<ControlNotice>,
    /// Incremented per session so late notices from a finished one are ignored
    session_id: u64,
    recording_path: Option<PathBuf>,
}

impl SessionController {
    /// Create an uninitialized controller
    ///
    /// # Errors
    /// Returns a configuration error if `config` fails validation
    pub fn new(
        config: SessionConfig,
        factory: Box<dyn PipelineFactory>,
        transports: Box<dyn TransportProvider>,
        permission: Box<dyn PermissionGate>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventHub::new(config.event_capacity);
        let (notice_tx, notice_rx) = bounded(config.notice_capacity);

        let state = SharedSessionState::new();
        state.write().playback_noise_suppression = config.playback_noise_suppression;

        Ok(Self {
            format: config.audio_format(),
            config,
            factory,
            transports,
            permission,
            engine: None,
            monitor_flags: Arc::new(Mutex::new(MonitorFlags::default())),
            state,
            events,
            notice_tx,
            notice_rx,
            session_id: 0,
            recording_path: None,
        })
    }

    /// Read access to the published state
    pub fn shared_state(&self) -> SharedSessionState {
        self.state.clone()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.snapshot()
    }

    /// Register an observer; it receives every event published from now on
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Hub observers can subscribe through from other threads
    pub fn event_hub(&self) -> EventHub {
        self.events.clone()
    }

    /// Receiver for notices from the real-time handlers
    pub fn notice_receiver(&self) -> Receiver<ControlNotice> {
        self.notice_rx.clone()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Authorize the effects engine and allocate pipelines and transport
    ///
    /// Only valid while uninitialized. Any failure reverts to
    /// [`ControllerState::Uninitialized`] so the call can be retried.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state.controller_state() != ControllerState::Uninitialized {
            debug!("Initialize ignored, controller is {}", self.state.controller_state());
            return Ok(());
        }

        self.update(|s| s.state = ControllerState::Authorizing);
        info!("Authorizing effects engine");

        let authorized = match self.factory.authorize(&self.config.credentials) {
            Ok(status) if status.is_active() => Ok(()),
            Ok(status) => Err(SessionError::AuthorizationFailed(format!(
                "license status {}",
                status
            ))),
            Err(e) => Err(SessionError::AuthorizationFailed(e.to_string())),
        };
        if let Err(e) = authorized {
            return Err(self.fail_initialization(e));
        }

        self.update(|s| s.state = ControllerState::Initializing);

        match self.allocate_engine() {
            Ok(engine) => {
                self.engine = Some(engine);
                self.update(|s| s.state = ControllerState::Ready);
                info!("Session controller ready ({} Hz)", self.format.sample_rate);
                Ok(())
            }
            Err(e) => Err(self.fail_initialization(e)),
        }
    }

    fn allocate_engine(&self) -> Result<Engine> {
        let as_allocation_error = |e: SessionError| match e {
            SessionError::PipelineAllocationFailed(_) => e,
            other => SessionError::PipelineAllocationFailed(other.to_string()),
        };

        let file_config = PipelineConfig::new(self.format);
        let mut file_pipeline = self
            .factory
            .new_pipeline(&file_config)
            .map_err(as_allocation_error)?;

        let monitor_config = file_config.with_latency_mode(LatencyMode::Playback);
        let mut monitor_pipeline = self
            .factory
            .new_pipeline(&monitor_config)
            .map_err(as_allocation_error)?;
        monitor_pipeline.set_noise_suppression(self.state.read().playback_noise_suppression);

        let power = self.config.noise_suppression_power;
        file_pipeline.set_noise_suppression_power(power);
        monitor_pipeline.set_noise_suppression_power(power);

        let transport = self.transports.open(self.format)?;

        Ok(Engine {
            transport,
            monitor_pipeline: pipeline::share(monitor_pipeline),
            file_pipeline: pipeline::share(file_pipeline),
        })
    }

    fn fail_initialization(&mut self, error: SessionError) -> SessionError {
        warn!("Initialization failed: {}", error);
        self.engine = None;
        self.update(|s| s.state = ControllerState::Uninitialized);
        error
    }

    /// Start a recording session
    ///
    /// No-op unless the mode is idle. Consults the permission gate first; a
    /// denial reverts to idle and raises [`ErrorStatus::RecordPermissionDenied`].
    pub fn start_recording(&mut self) -> Result<()> {
        if !self.state.read().is_idle() {
            debug!("Start recording ignored, mode is {}", self.state.mode());
            return Ok(());
        }
        if self.engine.is_none() {
            return Err(SessionError::DeviceUnavailable(
                "controller is not initialized".to_string(),
            ));
        }

        self.update(SessionState::begin_recording);

        if !self.permission.request_record_permission() {
            warn!("Record permission denied");
            self.update(|s| {
                s.end_recording();
                s.error_status = ErrorStatus::RecordPermissionDenied;
            });
            return Err(SessionError::PermissionDenied);
        }

        self.session_id += 1;
        match self.begin_capture() {
            Ok(path) => {
                info!("Recording started: {:?}", path);
                self.recording_path = Some(path);
                self.update(|s| s.recording_phase = SessionPhase::Performing);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start recording: {}", e);
                self.update(SessionState::end_recording);
                Err(e)
            }
        }
    }

    fn begin_capture(&mut self) -> Result<PathBuf> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| SessionError::DeviceUnavailable("no transport".to_string()))?;

        std::fs::create_dir_all(&self.config.recordings_dir)?;
        let sink = SampleSink::create_unique(&self.config.recordings_dir, self.format)?;
        let path = sink.path().to_path_buf();

        // A new session never renders what the last one left in the monitor pipeline
        {
            let mut flags = self.monitor_flags.lock();
            let enabled = flags.enabled;
            flags.set(enabled);
        }

        let capture = CaptureHandler::new(
            sink,
            self.format,
            Arc::clone(&self.monitor_flags),
            Arc::clone(&engine.monitor_pipeline),
            self.notice_tx.clone(),
            self.session_id,
        );
        let monitor = MonitorRenderHandler::new(
            Arc::clone(&self.monitor_flags),
            Arc::clone(&engine.monitor_pipeline),
        );

        if let Err(e) = engine
            .transport
            .start(StreamHandlers::duplex(Box::new(capture), Box::new(monitor)))
        {
            // The sink was dropped with the handlers; remove the empty take
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        Ok(path)
    }

    /// Stop the recording session
    ///
    /// Only valid while recording is performing. Returns the finalized file,
    /// or `None` if the transport could not be stopped cleanly.
    pub fn stop_recording(&mut self) -> Result<Option<PathBuf>> {
        {
            let state = self.state.read();
            if state.mode != SessionMode::Recording || !state.recording_phase.is_performing() {
                debug!(
                    "Stop recording ignored, mode {} phase {}",
                    state.mode, state.recording_phase
                );
                return Ok(None);
            }
        }

        self.update(|s| s.recording_phase = SessionPhase::Stopping);

        let stopped = self.stop_transport();
        let path = self.recording_path.take();
        self.update(SessionState::end_recording);

        let finished = match stopped {
            Ok(()) => path,
            Err(e) => {
                warn!("Failed to stop recording cleanly: {}", e);
                None
            }
        };

        info!("Recording stopped: {:?}", finished);
        self.emit(SessionEvent::RecordingFinished(finished.clone()));
        Ok(finished)
    }

    /// Start playing a WAV file, optionally through the file pipeline
    ///
    /// No-op unless the mode is idle. Open failures revert to idle and clear
    /// the playback target.
    pub fn start_playing(&mut self, path: impl AsRef<Path>, with_filter: bool) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        if !self.state.read().is_idle() {
            debug!("Start playing ignored, mode is {}", self.state.mode());
            return Ok(());
        }
        if self.engine.is_none() {
            return Err(SessionError::DeviceUnavailable(
                "controller is not initialized".to_string(),
            ));
        }

        self.update(|s| {
            s.begin_playing(PlaybackTarget {
                path: path.clone(),
                with_filter,
            })
        });

        self.session_id += 1;
        match self.begin_playback(&path, with_filter) {
            Ok(()) => {
                info!("Playing {:?} (filter: {})", path, with_filter);
                self.update(|s| s.playing_phase = SessionPhase::Performing);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start playing {:?}: {}", path, e);
                self.update(SessionState::end_playing);
                Err(e)
            }
        }
    }

    fn begin_playback(&mut self, path: &Path, with_filter: bool) -> Result<()> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| SessionError::DeviceUnavailable("no transport".to_string()))?;

        let source = SampleSource::open(path, self.format)?;

        if with_filter {
            let mut file_pipeline = engine.file_pipeline.lock();
            file_pipeline.reset();
            file_pipeline.set_noise_suppression(true);
        }

        let render = FileRenderHandler::new(
            source,
            with_filter,
            self.config.max_frames_per_callback,
            Arc::clone(&engine.file_pipeline),
            self.notice_tx.clone(),
            self.session_id,
        );

        engine
            .transport
            .start(StreamHandlers::render_only(Box::new(render)))
    }

    /// Stop the playing session
    ///
    /// Only valid while playing is performing.
    pub fn stop_playing(&mut self) -> Result<()> {
        {
            let state = self.state.read();
            if state.mode != SessionMode::Playing || !state.playing_phase.is_performing() {
                debug!(
                    "Stop playing ignored, mode {} phase {}",
                    state.mode, state.playing_phase
                );
                return Ok(());
            }
        }

        self.update(|s| s.playing_phase = SessionPhase::Stopping);
        let stopped = self.stop_transport();
        self.update(SessionState::end_playing);

        info!("Playing stopped");
        self.emit(SessionEvent::PlaybackFinished);
        stopped
    }

    /// Stop whatever is playing, then play `path` unless it was already the
    /// file playing with the same filter setting
    pub fn toggle_playing(&mut self, path: impl AsRef<Path>, with_filter: bool) -> Result<()> {
        let path = path.as_ref();
        let play_next = !self.state.read().is_playing_target(path, with_filter);

        self.stop_playing()?;

        if play_next {
            self.start_playing(path, with_filter)?;
        }
        Ok(())
    }

    /// Enable or disable monitor-through playback during recording
    pub fn set_playback(&mut self, enabled: bool) {
        self.monitor_flags.lock().set(enabled);
        self.update(|s| s.playback_enabled = enabled);
    }

    /// Toggle noise suppression on the monitor path
    pub fn set_playback_noise_suppression(&mut self, enabled: bool) {
        if let Some(engine) = &self.engine {
            engine.monitor_pipeline.lock().set_noise_suppression(enabled);
        }
        self.update(|s| s.playback_noise_suppression = enabled);
    }

    /// Set the filtering strength of both pipelines, clamped to `0.0..=1.0`
    pub fn set_noise_suppression_power(&mut self, power: f32) {
        let power = power.clamp(0.0, 1.0);
        self.config.noise_suppression_power = power;
        if let Some(engine) = &self.engine {
            engine.monitor_pipeline.lock().set_noise_suppression_power(power);
            engine.file_pipeline.lock().set_noise_suppression_power(power);
        }
    }

    /// Clear the sticky error status
    pub fn reset_error_status(&mut self) {
        if self.state.error_status() != ErrorStatus::NoError {
            self.update(|s| s.error_status = ErrorStatus::NoError);
        }
    }

    /// Apply one notice from a real-time handler
    pub fn handle_notice(&mut self, notice: ControlNotice) {
        match notice {
            ControlNotice::RecordedSeconds { session, seconds } => {
                if session != self.session_id {
                    return;
                }
                // Published one second at a time even if notices were dropped
                loop {
                    let advanced = {
                        let state = self.state.read();
                        state.mode == SessionMode::Recording && seconds > state.recorded_seconds
                    };
                    if !advanced {
                        break;
                    }
                    self.update(|s| s.recorded_seconds += 1);
                }
            }
            ControlNotice::PlaybackFinished { session } => {
                if session != self.session_id {
                    debug!("Ignoring stale playback notice for session {}", session);
                    return;
                }
                if let Err(e) = self.stop_playing() {
                    warn!("Failed to stop finished playback: {}", e);
                    self.emit(SessionEvent::Error(e));
                }
            }
        }
    }

    /// Apply all pending notices; returns how many were handled
    pub fn process_notices(&mut self) -> usize {
        let pending: Vec<ControlNotice> = self.notice_rx.try_iter().collect();
        let count = pending.len();
        for notice in pending {
            self.handle_notice(notice);
        }
        count
    }

    /// Stop any active session
    pub fn shutdown(&mut self) {
        let mode = self.state.mode();
        let result = match mode {
            SessionMode::Recording => self.stop_recording().map(|_| ()),
            SessionMode::Playing => self.stop_playing(),
            SessionMode::Idle => Ok(()),
        };
        if let Err(e) = result {
            warn!("Error while shutting down {} session: {}", mode, e);
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.events.publish(event);
    }

    fn update(&self, change: impl FnOnce(&mut SessionState)) {
        change(&mut *self.state.write());
        self.emit(SessionEvent::StateChanged);
    }

    fn stop_transport(&mut self) -> Result<()> {
        match self.engine.as_mut() {
            Some(engine) => engine.transport.stop(),
            None => Ok(()),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if engine.transport.is_active() {
                let _ = engine.transport.stop();
            }
        }
    }
}
