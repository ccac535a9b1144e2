//! Control context for a [`SessionController`]
//!
//! The controller lives on a dedicated thread, which serializes every
//! transition. Callers send [`SessionCommand`]s through a [`SessionHandle`];
//! notices from the real-time handlers are applied on the same thread.

use super::controller::SessionController;
use super::state::{EventHub, SessionEvent, SessionState, SharedSessionState};
use crate::{Result, SessionError};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requests accepted by the control thread
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Initialize,
    StartRecording,
    StopRecording,
    StartPlaying { path: PathBuf, with_filter: bool },
    StopPlaying,
    /// Stop the current playback, then play `path` unless it was already playing
    TogglePlaying { path: PathBuf, with_filter: bool },
    SetPlayback(bool),
    SetPlaybackNoiseSuppression(bool),
    SetNoiseSuppressionPower(f32),
    ResetErrorStatus,
    Shutdown,
}

/// Handle for sending commands and observing a running session service
///
/// Every handle is its own observer: cloning subscribes a fresh event
/// receiver, so clones never steal each other's events.
pub struct SessionHandle {
    command_tx: Sender<SessionCommand>,
    hub: EventHub,
    event_rx: Receiver<SessionEvent>,
    state: SharedSessionState,
}

impl Clone for SessionHandle {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            hub: self.hub.clone(),
            event_rx: self.hub.subscribe(),
            state: self.state.clone(),
        }
    }
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| SessionError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn initialize(&self) -> Result<()> {
        self.send(SessionCommand::Initialize)
    }

    pub fn start_recording(&self) -> Result<()> {
        self.send(SessionCommand::StartRecording)
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.send(SessionCommand::StopRecording)
    }

    pub fn start_playing(&self, path: impl Into<PathBuf>, with_filter: bool) -> Result<()> {
        self.send(SessionCommand::StartPlaying {
            path: path.into(),
            with_filter,
        })
    }

    pub fn stop_playing(&self) -> Result<()> {
        self.send(SessionCommand::StopPlaying)
    }

    pub fn toggle_playing(&self, path: impl Into<PathBuf>, with_filter: bool) -> Result<()> {
        self.send(SessionCommand::TogglePlaying {
            path: path.into(),
            with_filter,
        })
    }

    pub fn set_playback(&self, enabled: bool) -> Result<()> {
        self.send(SessionCommand::SetPlayback(enabled))
    }

    pub fn set_playback_noise_suppression(&self, enabled: bool) -> Result<()> {
        self.send(SessionCommand::SetPlaybackNoiseSuppression(enabled))
    }

    pub fn set_noise_suppression_power(&self, power: f32) -> Result<()> {
        self.send(SessionCommand::SetNoiseSuppressionPower(power))
    }

    pub fn reset_error_status(&self) -> Result<()> {
        self.send(SessionCommand::ResetErrorStatus)
    }

    /// Request shutdown; active sessions are stopped first
    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event, giving up after `timeout`
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Register an extra observer that sees every event from now on
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.hub.subscribe()
    }

    pub fn state(&self) -> SharedSessionState {
        self.state.clone()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.snapshot()
    }
}

pub struct SessionService;

impl SessionService {
    /// Build a controller on a new control thread and start serving commands
    ///
    /// `build` runs on the control thread, so transports that must not leave
    /// their creating thread can be opened there. Returns once the controller
    /// exists, or with the error `build` produced.
    pub fn spawn<F>(build: F) -> Result<(SessionHandle, JoinHandle<()>)>
    where
        F: FnOnce() -> Result<SessionController> + Send + 'static,
    {
        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let join = thread::Builder::new()
            .name("murmur-control".to_string())
            .spawn(move || {
                let controller = match build() {
                    Ok(controller) => controller,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let hub = controller.event_hub();
                let observers = (hub.subscribe(), hub, controller.shared_state());
                if ready_tx.send(Ok(observers)).is_err() {
                    warn!("Session service caller went away before startup");
                    return;
                }

                run(controller, command_rx);
            })
            .map_err(|e| {
                SessionError::ChannelError(format!("Failed to spawn control thread: {}", e))
            })?;

        let (event_rx, hub, state) = ready_rx
            .recv()
            .map_err(|e| SessionError::ChannelError(format!("Control thread exited: {}", e)))??;

        let handle = SessionHandle {
            command_tx,
            hub,
            event_rx,
            state,
        };
        Ok((handle, join))
    }
}

fn run(mut controller: SessionController, command_rx: Receiver<SessionCommand>) {
    info!("Session control thread starting");
    let notice_rx = controller.notice_receiver();

    loop {
        select! {
            recv(command_rx) -> command => {
                let command = match command {
                    Ok(command) => command,
                    Err(_) => {
                        debug!("All session handles dropped");
                        break;
                    }
                };
                if matches!(command, SessionCommand::Shutdown) {
                    break;
                }
                if let Err(e) = execute(&mut controller, command) {
                    warn!("Session command failed: {}", e);
                    controller.emit(SessionEvent::Error(e));
                }
            }
            recv(notice_rx) -> notice => {
                match notice {
                    Ok(notice) => controller.handle_notice(notice),
                    Err(e) => {
                        error!("Notice channel closed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    controller.shutdown();
    controller.emit(SessionEvent::Shutdown);
    info!("Session control thread stopped");
}

fn execute(controller: &mut SessionController, command: SessionCommand) -> Result<()> {
    debug!("Executing {:?}", command);
    match command {
        SessionCommand::Initialize => controller.initialize(),
        SessionCommand::StartRecording => controller.start_recording(),
        SessionCommand::StopRecording => controller.stop_recording().map(|_| ()),
        SessionCommand::StartPlaying { path, with_filter } => {
            controller.start_playing(path, with_filter)
        }
        SessionCommand::StopPlaying => controller.stop_playing(),
        SessionCommand::TogglePlaying { path, with_filter } => {
            controller.toggle_playing(path, with_filter)
        }
        SessionCommand::SetPlayback(enabled) => {
            controller.set_playback(enabled);
            Ok(())
        }
        SessionCommand::SetPlaybackNoiseSuppression(enabled) => {
            controller.set_playback_noise_suppression(enabled);
            Ok(())
        }
        SessionCommand::SetNoiseSuppressionPower(power) => {
            controller.set_noise_suppression_power(power);
            Ok(())
        }
        SessionCommand::ResetErrorStatus => {
            controller.reset_error_status();
            Ok(())
        }
        // Handled by the loop
        SessionCommand::Shutdown => Ok(()),
    }
}
