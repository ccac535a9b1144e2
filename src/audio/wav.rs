//! Sequential WAV sink and source for linear PCM frames

use crate::audio::AudioFormat;
use crate::{Result, SessionError};
use hound::{WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sequential writer producing a linear-PCM WAV file
///
/// The WAV header is finalized by [`SampleSink::finish`] or, failing that,
/// when the sink is dropped.
pub struct SampleSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    path: PathBuf,
    frames_written: u64,
}

impl SampleSink {
    /// Create a sink at `path`, truncating any existing file
    pub fn create(path: impl Into<PathBuf>, format: AudioFormat) -> Result<Self> {
        let path = path.into();
        let writer = WavWriter::create(&path, format.wav_spec()).map_err(|e| {
            SessionError::FileIoFailed(format!("Failed to create WAV writer {:?}: {}", path, e))
        })?;

        debug!("Opened recording sink {:?}", path);
        Ok(Self {
            writer: Some(writer),
            path,
            frames_written: 0,
        })
    }

    /// Create a sink with a fresh unique name inside `dir`
    pub fn create_unique(dir: impl AsRef<Path>, format: AudioFormat) -> Result<Self> {
        let file_name = format!("{}-output.wav", Uuid::new_v4());
        Self::create(dir.as_ref().join(file_name), format)
    }

    /// Append frames at the end of the file
    pub fn write_frames(&mut self, frames: &[i16]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            SessionError::FileIoFailed(format!("Sink {:?} already finalized", self.path))
        })?;

        for &frame in frames {
            writer.write_sample(frame)?;
        }
        self.frames_written += frames.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Finalize the WAV header and return the file path
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| {
                SessionError::FileIoFailed(format!("Failed to finalize WAV file: {}", e))
            })?;
        }
        info!(
            "Wrote {} frames to WAV file: {:?}",
            self.frames_written, self.path
        );
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for SampleSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            match writer.finalize() {
                Ok(()) => info!(
                    "Wrote {} frames to WAV file: {:?}",
                    self.frames_written, self.path
                ),
                Err(e) => warn!("Failed to finalize WAV file {:?}: {}", self.path, e),
            }
        }
    }
}

/// Sequential reader over a linear-PCM WAV file
pub struct SampleSource {
    reader: WavReader<BufReader<File>>,
    path: PathBuf,
}

impl SampleSource {
    /// Open `path` for sequential reads; the file must already be in `format`
    pub fn open(path: impl Into<PathBuf>, format: AudioFormat) -> Result<Self> {
        let path = path.into();
        let reader = WavReader::open(&path).map_err(|e| {
            SessionError::FileIoFailed(format!("Failed to open WAV file {:?}: {}", path, e))
        })?;

        let spec = reader.spec();
        if !format.matches(&spec) {
            return Err(SessionError::FileIoFailed(format!(
                "Unsupported WAV format in {:?}: {} Hz, {} channels, {} bits",
                path, spec.sample_rate, spec.channels, spec.bits_per_sample
            )));
        }

        debug!("Opened playback source {:?} ({} frames)", path, reader.duration());

        Ok(Self { reader, path })
    }

    /// Fill `output` with the next frames
    ///
    /// Returns the number of frames read; fewer than `output.len()` means the
    /// end of the stream was reached.
    pub fn read_frames(&mut self, output: &mut [i16]) -> Result<usize> {
        let mut read = 0;
        let mut samples = self.reader.samples::<i16>();

        for slot in output.iter_mut() {
            match samples.next() {
                Some(sample) => {
                    *slot = sample?;
                    read += 1;
                }
                None => break,
            }
        }

        Ok(read)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write a whole buffer of frames to a WAV file
pub fn write_wav<P: AsRef<Path>>(path: P, frames: &[i16], format: AudioFormat) -> Result<()> {
    let mut sink = SampleSink::create(path.as_ref(), format)?;
    sink.write_frames(frames)?;
    sink.finish()?;
    Ok(())
}

/// Read a whole WAV file
///
/// # Returns
/// * Tuple of (frames, spec)
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<i16>, WavSpec)> {
    let mut reader = WavReader::open(path.as_ref())
        .map_err(|e| SessionError::FileIoFailed(format!("Failed to open WAV file: {}", e)))?;

    let spec = reader.spec();
    let frames = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((frames, spec))
}
