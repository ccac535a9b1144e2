//! Session service tests
//!
//! Commands go through the control thread; the scripted transport is driven
//! from the test thread like a real-time callback would be.

mod common;

use common::{ramp, MockDriver, ScriptedFactory};
use murmur::audio::write_wav;
use murmur::permission::StaticPermission;
use murmur::{
    ControllerState, ErrorStatus, SessionConfig, SessionController, SessionError, SessionEvent,
    SessionHandle, SessionMode, SessionService,
};
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const RATE: u32 = 1000;
const TIMEOUT: Duration = Duration::from_secs(5);

fn spawn(dir: &Path, driver: &MockDriver, granted: bool) -> (SessionHandle, JoinHandle<()>) {
    let config = SessionConfig::default()
        .with_sample_rate(RATE)
        .with_recordings_dir(dir);
    let provider = driver.provider();

    SessionService::spawn(move || {
        SessionController::new(
            config,
            Box::new(ScriptedFactory::new()),
            Box::new(provider),
            Box::new(StaticPermission(granted)),
        )
    })
    .unwrap()
}

/// Wait for the first event matching `pick`
fn wait_for<T>(
    handle: &SessionHandle,
    mut pick: impl FnMut(&SessionEvent) -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if let Some(event) = handle.recv_event_timeout(Duration::from_millis(50)) {
            if let Some(value) = pick(&event) {
                return Some(value);
            }
        }
    }
    None
}

/// Poll the published state until `done` holds
fn wait_until(handle: &SessionHandle, done: impl Fn(&murmur::SessionState) -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done(&handle.snapshot()) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_spawn_reports_build_errors() {
    let result = SessionService::spawn(|| Err(SessionError::ConfigError("bad".to_string())));
    assert!(matches!(result, Err(SessionError::ConfigError(_))));
}

#[test]
fn test_record_through_service() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, true);

    handle.initialize().unwrap();
    assert!(wait_until(&handle, |s| s.state == ControllerState::Ready));

    handle.start_recording().unwrap();
    assert!(wait_until(&handle, |s| s.is_recording()));

    let frames = ramp(0, 1500);
    assert!(driver.capture(&frames));
    // Notices are applied on the control thread
    assert!(wait_until(&handle, |s| s.recorded_seconds == 1));

    handle.stop_recording().unwrap();
    let path = wait_for(&handle, |e| match e {
        SessionEvent::RecordingFinished(path) => Some(path.clone()),
        _ => None,
    })
    .flatten()
    .expect("recording finished with a file");

    let (written, _) = murmur::audio::read_wav(&path).unwrap();
    assert_eq!(written, frames);
    assert_eq!(handle.snapshot().mode, SessionMode::Idle);

    handle.shutdown().unwrap();
    join.join().unwrap();
}

#[test]
fn test_stop_issued_during_start_is_queued() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, true);

    handle.initialize().unwrap();
    handle.start_recording().unwrap();
    handle.stop_recording().unwrap();

    let finished = wait_for(&handle, |e| match e {
        SessionEvent::RecordingFinished(path) => Some(path.clone()),
        _ => None,
    });
    assert!(matches!(finished, Some(Some(_))));
    assert_eq!(driver.log(), vec!["start duplex", "stop"]);
    assert_eq!(handle.snapshot().mode, SessionMode::Idle);

    handle.shutdown().unwrap();
    join.join().unwrap();
}

#[test]
fn test_playback_finishes_on_its_own() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, true);
    let audio = dir.path().join("a.wav");
    write_wav(&audio, &ramp(0, 150), murmur::audio::AudioFormat::mono_i16(RATE)).unwrap();

    handle.initialize().unwrap();
    handle.start_playing(&audio, false).unwrap();
    assert!(wait_until(&handle, |s| s.is_playing()));

    driver.render(100).unwrap();
    driver.render(100).unwrap();

    assert!(wait_until(&handle, |s| s.is_idle() && s.playback_target.is_none()));
    assert!(!driver.is_active());

    handle.shutdown().unwrap();
    join.join().unwrap();
}

#[test]
fn test_failed_command_emits_error() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, false);

    handle.initialize().unwrap();
    handle.start_recording().unwrap();

    let error = wait_for(&handle, |e| match e {
        SessionEvent::Error(e) => Some(e.clone()),
        _ => None,
    });
    assert_eq!(error, Some(SessionError::PermissionDenied));
    assert_eq!(
        handle.state().error_status(),
        ErrorStatus::RecordPermissionDenied
    );

    handle.reset_error_status().unwrap();
    assert!(wait_until(&handle, |s| s.error_status == ErrorStatus::NoError));

    handle.shutdown().unwrap();
    join.join().unwrap();
}

#[test]
fn test_shutdown_stops_active_session() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, true);

    handle.initialize().unwrap();
    handle.set_playback(true).unwrap();
    handle.start_recording().unwrap();
    assert!(wait_until(&handle, |s| s.is_recording()));

    handle.shutdown().unwrap();
    join.join().unwrap();

    assert!(!driver.is_active());
    assert_eq!(handle.snapshot().mode, SessionMode::Idle);
    assert!(std::iter::from_fn(|| handle.try_recv_event()).any(|e| e == SessionEvent::Shutdown));
}

#[test]
fn test_every_handle_observes_every_event() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, true);
    let observer = handle.clone();

    handle.initialize().unwrap();
    handle.start_recording().unwrap();
    handle.stop_recording().unwrap();

    let finished = |h: &SessionHandle| {
        wait_for(h, |e| match e {
            SessionEvent::RecordingFinished(path) => Some(path.clone()),
            _ => None,
        })
        .flatten()
    };
    let seen_by_handle = finished(&handle);
    let seen_by_observer = finished(&observer);
    assert!(seen_by_handle.is_some());
    assert_eq!(seen_by_handle, seen_by_observer);

    handle.shutdown().unwrap();
    join.join().unwrap();
}

#[test]
fn test_playback_finished_reaches_observers() {
    let dir = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let (handle, join) = spawn(dir.path(), &driver, true);
    let audio = dir.path().join("a.wav");
    write_wav(&audio, &ramp(0, 50), murmur::audio::AudioFormat::mono_i16(RATE)).unwrap();

    handle.initialize().unwrap();
    handle.set_noise_suppression_power(0.9).unwrap();
    handle.start_playing(&audio, true).unwrap();
    assert!(wait_until(&handle, |s| s.is_playing()));
    driver.render(100).unwrap();

    let finished = wait_for(&handle, |e| (*e == SessionEvent::PlaybackFinished).then_some(()));
    assert!(finished.is_some());
    assert!(handle.snapshot().is_idle());

    handle.shutdown().unwrap();
    join.join().unwrap();
}
