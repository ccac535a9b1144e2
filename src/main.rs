use anyhow::{bail, Context, Result};
use murmur::{SessionConfig, SessionController, SessionEvent, SessionHandle, SessionService};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage:
  murmur record <seconds> [--monitor]
  murmur play <file.wav> [--denoise]
  murmur devices";

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config()?;

    match args.first().map(String::as_str) {
        Some("record") => {
            let seconds: u64 = args
                .get(1)
                .context(USAGE)?
                .parse()
                .context("seconds must be a whole number")?;
            let monitor = args.iter().any(|a| a == "--monitor");
            record(config, seconds, monitor)
        }
        Some("play") => {
            let path = PathBuf::from(args.get(1).context(USAGE)?);
            let denoise = args.iter().any(|a| a == "--denoise");
            play(config, path, denoise)
        }
        Some("devices") => list_devices(),
        _ => bail!(USAGE),
    }
}

fn load_config() -> Result<SessionConfig> {
    match std::env::var_os("MURMUR_CONFIG") {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Ok(SessionConfig::from_toml_file(&path)?)
        }
        None => Ok(SessionConfig::default()),
    }
}

#[cfg(feature = "audio-io")]
fn spawn_service(config: SessionConfig) -> Result<(SessionHandle, std::thread::JoinHandle<()>)> {
    use murmur::audio::{CpalTransportProvider, InputDevicePermission};
    use murmur::pipeline::GateFactory;

    let (handle, join) = SessionService::spawn(move || {
        SessionController::new(
            config,
            Box::new(GateFactory::new()),
            Box::new(CpalTransportProvider),
            Box::new(InputDevicePermission),
        )
    })?;

    handle.initialize()?;
    let deadline = Instant::now() + Duration::from_secs(10);
    while !handle.state().controller_state().is_ready() {
        if let Some(SessionEvent::Error(e)) = handle.recv_event_timeout(Duration::from_millis(100))
        {
            bail!("{}", e.user_message());
        }
        if Instant::now() > deadline {
            bail!("Timed out initializing the session controller");
        }
    }
    Ok((handle, join))
}

#[cfg(not(feature = "audio-io"))]
fn spawn_service(_config: SessionConfig) -> Result<(SessionHandle, std::thread::JoinHandle<()>)> {
    bail!("murmur was built without the audio-io feature")
}

fn record(config: SessionConfig, seconds: u64, monitor: bool) -> Result<()> {
    let (handle, join) = spawn_service(config)?;

    handle.set_playback(monitor)?;
    handle.start_recording()?;
    info!("Recording for {} s (monitor: {})", seconds, monitor);

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut last_reported = 0;
    while Instant::now() < deadline {
        match handle.recv_event_timeout(Duration::from_millis(100)) {
            Some(SessionEvent::Error(e)) => {
                handle.shutdown()?;
                let _ = join.join();
                bail!("{}", e.user_message());
            }
            _ => {
                let state = handle.snapshot();
                if state.recorded_seconds != last_reported {
                    last_reported = state.recorded_seconds;
                    println!("{}", state.recorded_time());
                }
            }
        }
    }

    handle.stop_recording()?;
    let finished = wait_for(&handle, Duration::from_secs(5), |event| match event {
        SessionEvent::RecordingFinished(path) => Some(path.clone()),
        _ => None,
    });

    match finished.flatten() {
        Some(path) => println!("Saved {}", path.display()),
        None => warn!("Recording did not finish cleanly"),
    }

    handle.shutdown()?;
    let _ = join.join();
    Ok(())
}

fn play(config: SessionConfig, path: PathBuf, denoise: bool) -> Result<()> {
    let (handle, join) = spawn_service(config)?;

    handle.start_playing(&path, denoise)?;
    info!("Playing {:?} (denoise: {})", path, denoise);

    // A failed start reports an error and never finishes
    loop {
        match handle.recv_event_timeout(Duration::from_millis(100)) {
            Some(SessionEvent::Error(e)) => {
                handle.shutdown()?;
                let _ = join.join();
                bail!("{}", e.user_message());
            }
            Some(SessionEvent::PlaybackFinished) => break,
            Some(SessionEvent::Shutdown) => bail!("Session service stopped during playback"),
            _ => {}
        }
    }
    println!("Finished {}", path.display());

    handle.shutdown()?;
    let _ = join.join();
    Ok(())
}

fn wait_for<T>(
    handle: &SessionHandle,
    timeout: Duration,
    mut pick: impl FnMut(&SessionEvent) -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(event) = handle.recv_event_timeout(Duration::from_millis(100)) {
            if let Some(value) = pick(&event) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(feature = "audio-io")]
fn list_devices() -> Result<()> {
    for device in murmur::audio::list_input_devices() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}{}", device.name, marker);
    }
    Ok(())
}

#[cfg(not(feature = "audio-io"))]
fn list_devices() -> Result<()> {
    bail!("murmur was built without the audio-io feature")
}
