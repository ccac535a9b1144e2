//! Per-frame handlers installed on the transport
//!
//! These run on real-time callback contexts. They only touch pre-sized
//! buffers, read the monitor flags under a short lock, and report back to the
//! control context through a bounded channel with `try_send`. None of them
//! changes the session mode.

use crate::audio::{AudioFormat, ProduceHandler, ReceiveHandler, SampleSink, SampleSource};
use crate::pipeline::SharedPipeline;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Requests from real-time handlers to the control context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlNotice {
    /// The recording crossed another whole second
    RecordedSeconds { session: u64, seconds: u64 },
    /// The playing session has nothing left to render
    PlaybackFinished { session: u64 },
}

/// Monitor-through playback flags
///
/// Written from the control context, read from both real-time contexts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorFlags {
    pub enabled: bool,
    /// Reset the monitor pipeline before its next push
    pub flush_needed: bool,
}

impl MonitorFlags {
    /// Enabling monitoring always restarts from an empty pipeline
    pub fn set(&mut self, enabled: bool) {
        self.flush_needed = enabled;
        self.enabled = enabled;
    }

    /// Read both flags, consuming the pending flush
    pub fn take(&mut self) -> (bool, bool) {
        (self.enabled, std::mem::take(&mut self.flush_needed))
    }
}

pub type SharedMonitorFlags = Arc<Mutex<MonitorFlags>>;

/// Capture path of a recording session
///
/// Appends every captured frame to the sink and, when monitoring is on, feeds
/// the same frames to the monitor pipeline without pulling output.
pub struct CaptureHandler {
    sink: SampleSink,
    format: AudioFormat,
    recorded_frames: u64,
    notified_seconds: u64,
    write_failed: bool,
    flags: SharedMonitorFlags,
    pipeline: SharedPipeline,
    notices: Sender<ControlNotice>,
    session: u64,
}

impl CaptureHandler {
    pub fn new(
        sink: SampleSink,
        format: AudioFormat,
        flags: SharedMonitorFlags,
        pipeline: SharedPipeline,
        notices: Sender<ControlNotice>,
        session: u64,
    ) -> Self {
        Self {
            sink,
            format,
            recorded_frames: 0,
            notified_seconds: 0,
            write_failed: false,
            flags,
            pipeline,
            notices,
            session,
        }
    }
}

impl ReceiveHandler for CaptureHandler {
    fn on_receive(&mut self, input: &[i16]) {
        if let Err(e) = self.sink.write_frames(input) {
            if !self.write_failed {
                warn!("Recording write failed, suppressing further errors: {}", e);
                self.write_failed = true;
            }
        }

        self.recorded_frames += input.len() as u64;
        // Only the latest count is sent; a full channel retries on the next callback
        let seconds = self.format.whole_seconds(self.recorded_frames);
        if seconds > self.notified_seconds {
            let notice = ControlNotice::RecordedSeconds {
                session: self.session,
                seconds,
            };
            if self.notices.try_send(notice).is_ok() {
                self.notified_seconds = seconds;
            }
        }

        let (enabled, flush_needed) = self.flags.lock().take();
        if flush_needed || enabled {
            let mut pipeline = self.pipeline.lock();
            if flush_needed {
                pipeline.reset();
            }
            if enabled {
                pipeline.process(Some(input), None);
            }
        }
    }
}

/// Render path of a recording session: monitor-through playback
pub struct MonitorRenderHandler {
    flags: SharedMonitorFlags,
    pipeline: SharedPipeline,
}

impl MonitorRenderHandler {
    pub fn new(flags: SharedMonitorFlags, pipeline: SharedPipeline) -> Self {
        Self { flags, pipeline }
    }
}

impl ProduceHandler for MonitorRenderHandler {
    fn on_produce(&mut self, output: &mut [i16]) {
        let enabled = self.flags.lock().enabled;

        if enabled {
            let len = output.len();
            let written = self.pipeline.lock().process(None, Some(&mut *output));
            output[written.min(len)..].fill(0);
        } else {
            output.fill(0);
        }
    }
}

/// Render path of a playing session
///
/// Streams the source file, optionally through the file pipeline, and asks the
/// control context to stop once everything has been rendered.
pub struct FileRenderHandler {
    source: Option<SampleSource>,
    staging: Vec<i16>,
    with_filter: bool,
    pipeline: SharedPipeline,
    notices: Sender<ControlNotice>,
    session: u64,
    stop_requested: bool,
}

impl FileRenderHandler {
    pub fn new(
        source: SampleSource,
        with_filter: bool,
        max_frames: usize,
        pipeline: SharedPipeline,
        notices: Sender<ControlNotice>,
        session: u64,
    ) -> Self {
        Self {
            source: Some(source),
            staging: vec![0; max_frames],
            with_filter,
            pipeline,
            notices,
            session,
            stop_requested: false,
        }
    }

    /// Read the next chunk into the staging buffer, closing the source on a short read
    fn read_chunk(&mut self, requested: usize) -> usize {
        if self.staging.len() < requested {
            // Only when the device exceeds the configured callback size
            self.staging.resize(requested, 0);
        }

        let Some(source) = self.source.as_mut() else {
            return 0;
        };

        let read = match source.read_frames(&mut self.staging[..requested]) {
            Ok(read) => read,
            Err(e) => {
                debug!("Playback read failed, treating as end of stream: {}", e);
                0
            }
        };

        if read < requested {
            debug!("Playback source exhausted");
            self.source = None;
        }
        read
    }

    fn request_stop(&mut self) {
        if self.stop_requested {
            return;
        }
        match self.notices.try_send(ControlNotice::PlaybackFinished {
            session: self.session,
        }) {
            Ok(()) => self.stop_requested = true,
            // Retried on the next callback
            Err(e) => debug!("Failed to request playback stop: {}", e),
        }
    }
}

impl ProduceHandler for FileRenderHandler {
    fn on_produce(&mut self, output: &mut [i16]) {
        let requested = output.len();
        let read = self.read_chunk(requested);

        if !self.with_filter {
            output[..read].copy_from_slice(&self.staging[..read]);
            output[read..].fill(0);
            if self.source.is_none() {
                self.request_stop();
            }
            return;
        }

        let drained = {
            let mut pipeline = self.pipeline.lock();

            if read > 0 {
                let written = pipeline
                    .process(Some(&self.staging[..read]), Some(&mut output[..read]))
                    .min(read);
                output[written..read].fill(0);
            }

            if read < requested {
                let remainder = &mut output[read..];
                let wanted = remainder.len();
                let pulled = pipeline.flush(Some(remainder)).min(wanted);
                output[read + pulled..].fill(0);
                pulled < wanted
            } else {
                false
            }
        };

        if drained {
            self.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_off_then_on_needs_one_flush() {
        let mut flags = MonitorFlags::default();
        flags.set(false);
        flags.set(true);

        assert_eq!(flags.take(), (true, true));
        // Consumed
        assert_eq!(flags.take(), (true, false));
    }

    #[test]
    fn test_disable_clears_pending_flush() {
        let mut flags = MonitorFlags::default();
        flags.set(true);
        flags.set(false);
        assert_eq!(flags.take(), (false, false));
    }
}
