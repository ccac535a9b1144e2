//! Observable session state
//!
//! The controller is the only writer. Observers read through
//! [`SharedSessionState`] or react to [`SessionEvent`]s:
//! - **Controller**: mutates state on the control context, then emits `StateChanged`
//! - **UI / CLI**: reads snapshots for rendering, sends commands
//! - **Tests**: read snapshots for assertions

use crate::SessionError;
use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;

/// Lifecycle of the controller itself
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Uninitialized,
    /// Waiting for the effects engine license check
    Authorizing,
    /// Allocating pipelines and the transport
    Initializing,
    Ready,
}

impl ControllerState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ControllerState::Ready)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Uninitialized => write!(f, "Uninitialized"),
            ControllerState::Authorizing => write!(f, "Authorization..."),
            ControllerState::Initializing => write!(f, "Initialization..."),
            ControllerState::Ready => write!(f, "Ready"),
        }
    }
}

/// Which kind of session owns the transport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionMode {
    #[default]
    Idle,
    Recording,
    Playing,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Idle => write!(f, "Idle"),
            SessionMode::Recording => write!(f, "Recording"),
            SessionMode::Playing => write!(f, "Playing"),
        }
    }
}

/// Phase of a recording or playing session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Inactive,
    Starting,
    Performing,
    Stopping,
}

impl SessionPhase {
    pub fn is_inactive(&self) -> bool {
        matches!(self, SessionPhase::Inactive)
    }

    pub fn is_performing(&self) -> bool {
        matches!(self, SessionPhase::Performing)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Inactive => write!(f, "Inactive"),
            SessionPhase::Starting => write!(f, "Starting"),
            SessionPhase::Performing => write!(f, "Performing"),
            SessionPhase::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Single-slot sticky status shown to the user until cleared
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorStatus {
    #[default]
    NoError,
    RecordPermissionDenied,
}

/// File selected for the current playing session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackTarget {
    pub path: PathBuf,
    pub with_filter: bool,
}

/// Everything the controller publishes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub state: ControllerState,
    pub mode: SessionMode,
    pub recording_phase: SessionPhase,
    pub playing_phase: SessionPhase,
    /// Whole seconds captured by the current or last recording
    pub recorded_seconds: u64,
    pub playback_target: Option<PlaybackTarget>,
    /// Monitor-through playback during recording
    pub playback_enabled: bool,
    /// Noise suppression on the monitor path
    pub playback_noise_suppression: bool,
    pub error_status: ErrorStatus,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.mode, SessionMode::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.mode, SessionMode::Recording) && self.recording_phase.is_performing()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.mode, SessionMode::Playing) && self.playing_phase.is_performing()
    }

    /// Whether `path` is playing with the given filter setting
    ///
    /// Sessions that are stopping no longer count as playing.
    pub fn is_playing_target(&self, path: &std::path::Path, with_filter: bool) -> bool {
        match &self.playback_target {
            Some(target) => {
                target.path == path
                    && target.with_filter == with_filter
                    && matches!(
                        self.playing_phase,
                        SessionPhase::Starting | SessionPhase::Performing
                    )
            }
            None => false,
        }
    }

    /// Recorded time as `HH:MM:SS`
    pub fn recorded_time(&self) -> String {
        let secs = self.recorded_seconds;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }

    // === Session transitions ===

    pub(crate) fn begin_recording(&mut self) {
        self.mode = SessionMode::Recording;
        self.recording_phase = SessionPhase::Starting;
        self.recorded_seconds = 0;
    }

    pub(crate) fn end_recording(&mut self) {
        self.recording_phase = SessionPhase::Inactive;
        self.mode = SessionMode::Idle;
    }

    pub(crate) fn begin_playing(&mut self, target: PlaybackTarget) {
        self.mode = SessionMode::Playing;
        self.playing_phase = SessionPhase::Starting;
        self.playback_target = Some(target);
    }

    pub(crate) fn end_playing(&mut self) {
        self.playing_phase = SessionPhase::Inactive;
        self.mode = SessionMode::Idle;
        self.playback_target = None;
    }
}

/// Thread-safe read access to the published state
#[derive(Clone, Default)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionState>>,
}

impl SharedSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionState> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SessionState> {
        self.inner.write()
    }

    /// Get a copy of the current state (no lock held after return)
    pub fn snapshot(&self) -> SessionState {
        self.inner.read().clone()
    }

    pub fn controller_state(&self) -> ControllerState {
        self.inner.read().state
    }

    pub fn mode(&self) -> SessionMode {
        self.inner.read().mode
    }

    pub fn recording_phase(&self) -> SessionPhase {
        self.inner.read().recording_phase
    }

    pub fn playing_phase(&self) -> SessionPhase {
        self.inner.read().playing_phase
    }

    pub fn recorded_seconds(&self) -> u64 {
        self.inner.read().recorded_seconds
    }

    pub fn playback_target(&self) -> Option<PlaybackTarget> {
        self.inner.read().playback_target.clone()
    }

    pub fn error_status(&self) -> ErrorStatus {
        self.inner.read().error_status
    }
}

/// Notifications for observers
///
/// State should be read from [`SharedSessionState`] rather than reconstructed
/// from events.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Published state changed (trigger a repaint)
    StateChanged,
    /// A recording session ended; carries the finalized file if any
    RecordingFinished(Option<PathBuf>),
    /// A playing session that reached `Performing` has ended
    PlaybackFinished,
    /// An operation failed and the controller reverted to a safe state
    Error(SessionError),
    Shutdown,
}

/// Fan-out of [`SessionEvent`]s to every registered observer
///
/// Each [`subscribe`](EventHub::subscribe) call registers a new receiver that
/// gets every event published afterwards. `StateChanged` is coalesced: it is
/// skipped for an observer that already has `backlog` events waiting. All
/// other events are always delivered. Observers whose receiver was dropped are
/// pruned on the next publish.
#[derive(Clone)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
    backlog: usize,
}

impl EventHub {
    pub fn new(backlog: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            backlog: backlog.max(1),
        }
    }

    /// Register a new observer
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let coalesce = matches!(event, SessionEvent::StateChanged);
        let backlog = self.backlog;

        self.subscribers.lock().retain(|tx| {
            if coalesce && tx.len() >= backlog {
                return true;
            }
            !matches!(
                tx.try_send(event.clone()),
                Err(TrySendError::Disconnected(_))
            )
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
