//! cpal-backed audio transport
//!
//! Opens the default input and output devices at the session sample rate and
//! adapts their interleaved float streams to the mono 16-bit frames handlers
//! work with. Devices that cannot run f32 streams at that rate are rejected
//! when the transport is opened, not when a stream is started.

use crate::audio::format::{f32_to_i16, i16_to_f32};
use crate::audio::{AudioFormat, StreamHandlers, Transport, TransportProvider};
use crate::permission::PermissionGate;
use crate::{Result, SessionError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use tracing::{error, info, warn};

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default input device
    pub is_default: bool,
}

/// Duplex transport over the default cpal host
pub struct CpalTransport {
    format: AudioFormat,
    input_device: Option<Device>,
    output_device: Device,
    input_config: Option<StreamConfig>,
    output_config: StreamConfig,
    input_stream: Option<Stream>,
    output_stream: Option<Stream>,
}

impl CpalTransport {
    /// Open the default devices at `format`'s sample rate
    ///
    /// # Errors
    /// Returns an error if no output device is available or configuration fails
    pub fn new(format: AudioFormat) -> Result<Self> {
        let host = cpal::default_host();

        let output_device = host.default_output_device().ok_or_else(|| {
            SessionError::DeviceUnavailable("No output device available".into())
        })?;
        info!(
            "Using output device: {}",
            output_device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        let output_default = output_device
            .default_output_config()
            .ok()
            .map(|config| config.channels());
        let output_ranges = output_device.supported_output_configs().map_err(|e| {
            SessionError::DeviceUnavailable(format!("Failed to query output configs: {}", e))
        })?;
        let output_channels = supported_channels(output_ranges, format.sample_rate, output_default)
            .ok_or_else(|| {
                SessionError::DeviceUnavailable(format!(
                    "Output device does not support {} Hz",
                    format.sample_rate
                ))
            })?;

        // Capture is optional until a recording session asks for it
        let input_device = host.default_input_device();
        let input_config = match &input_device {
            Some(device) => {
                info!(
                    "Using input device: {}",
                    device.name().unwrap_or_else(|_| "Unknown".to_string())
                );
                let preferred = device.default_input_config().ok().map(|c| c.channels());
                let ranges = device.supported_input_configs().map_err(|e| {
                    SessionError::DeviceUnavailable(format!(
                        "Failed to query input configs: {}",
                        e
                    ))
                })?;
                let channels = supported_channels(ranges, format.sample_rate, preferred)
                    .ok_or_else(|| {
                        SessionError::DeviceUnavailable(format!(
                            "Input device does not support {} Hz",
                            format.sample_rate
                        ))
                    })?;
                Some(stream_config(channels, format))
            }
            None => {
                warn!("No input device available, capture disabled");
                None
            }
        };

        Ok(Self {
            format,
            input_device,
            output_device,
            input_config,
            output_config: stream_config(output_channels, format),
            input_stream: None,
            output_stream: None,
        })
    }

    fn build_input(&self, mut handler: Box<dyn crate::audio::ReceiveHandler>) -> Result<Stream> {
        let (device, config) = match (&self.input_device, &self.input_config) {
            (Some(device), Some(config)) => (device, config),
            _ => {
                return Err(SessionError::DeviceUnavailable(
                    "No input device available".into(),
                ))
            }
        };

        let channels = config.channels as usize;
        let mut scratch: Vec<i16> = Vec::with_capacity(4096);

        let err_fn = |err| {
            error!("Audio input stream error: {}", err);
        };

        device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    // Average all channels to create mono
                    scratch.extend(data.chunks(channels).map(|frame| {
                        f32_to_i16(frame.iter().sum::<f32>() / channels as f32)
                    }));
                    handler.on_receive(&scratch);
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                SessionError::DeviceUnavailable(format!("Failed to build input stream: {}", e))
            })
    }

    fn build_output(&self, mut handler: Box<dyn crate::audio::ProduceHandler>) -> Result<Stream> {
        let channels = self.output_config.channels as usize;
        let mut scratch: Vec<i16> = Vec::with_capacity(4096);

        let err_fn = |err| {
            error!("Audio output stream error: {}", err);
        };

        self.output_device
            .build_output_stream(
                &self.output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.resize(frames, 0);
                    handler.on_produce(&mut scratch[..frames]);

                    for (frame, &sample) in data.chunks_mut(channels).zip(scratch.iter()) {
                        frame.fill(i16_to_f32(sample));
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                SessionError::DeviceUnavailable(format!("Failed to build output stream: {}", e))
            })
    }
}

impl Transport for CpalTransport {
    fn start(&mut self, handlers: StreamHandlers) -> Result<()> {
        if self.is_active() {
            warn!("Transport already active, ignoring start request");
            return Ok(());
        }
        if handlers.is_empty() {
            return Ok(());
        }

        let input_stream = handlers
            .receive
            .map(|handler| self.build_input(handler))
            .transpose()?;
        let output_stream = handlers
            .produce
            .map(|handler| self.build_output(handler))
            .transpose()?;

        for stream in input_stream.iter().chain(output_stream.iter()) {
            stream.play().map_err(|e| {
                SessionError::DeviceUnavailable(format!("Failed to start stream: {}", e))
            })?;
        }

        info!(
            "Transport started: capture={}, render={}",
            input_stream.is_some(),
            output_stream.is_some()
        );
        self.input_stream = input_stream;
        self.output_stream = output_stream;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let was_active = self.is_active();

        // Dropping a stream joins its callback and drops the handler it owns
        drop(self.input_stream.take());
        drop(self.output_stream.take());

        if was_active {
            info!("Transport stopped");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.input_stream.is_some() || self.output_stream.is_some()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}

impl Drop for CpalTransport {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Opens [`CpalTransport`]s on the default host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalTransportProvider;

impl TransportProvider for CpalTransportProvider {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn Transport>> {
        Ok(Box::new(CpalTransport::new(format)?))
    }
}

/// Grants record permission when the host exposes an input device
#[derive(Debug, Default, Clone, Copy)]
pub struct InputDevicePermission;

impl PermissionGate for InputDevicePermission {
    fn request_record_permission(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }
}

fn stream_config(channels: u16, format: AudioFormat) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Channel count for f32 streams at `sample_rate`
///
/// Keeps `preferred` when some range offers it, otherwise takes the fewest
/// channels. `None` when no range covers the rate.
fn supported_channels(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
    preferred: Option<u16>,
) -> Option<u16> {
    let channels: Vec<u16> = ranges
        .into_iter()
        .filter(|range| {
            range.sample_format() == SampleFormat::F32
                && range.min_sample_rate().0 <= sample_rate
                && sample_rate <= range.max_sample_rate().0
        })
        .map(|range| range.channels())
        .collect();

    match preferred {
        Some(wanted) if channels.contains(&wanted) => Some(wanted),
        _ => channels.into_iter().min(),
    }
}

/// List available audio input devices
pub fn list_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_device_name = host.default_input_device().and_then(|d| d.name().ok());

    host.input_devices()
        .map(|devices| {
            devices
                .filter_map(|device| {
                    let name = device.name().ok()?;
                    let is_default = default_device_name
                        .as_ref()
                        .map(|d| d == &name)
                        .unwrap_or(false);
                    Some(AudioDeviceInfo { name, is_default })
                })
                .collect()
        })
        .unwrap_or_default()
}
