//! Fixed PCM format shared by transport, files and pipelines

use hound::{SampleFormat, WavSpec};

/// Linear PCM format: native-endian signed 16-bit, mono
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn mono_i16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    /// Bytes occupied by one frame
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Whole seconds covered by `frames`
    pub fn whole_seconds(&self, frames: u64) -> u64 {
        frames / self.sample_rate as u64
    }

    /// WAV container spec for this format
    pub fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: SampleFormat::Int,
        }
    }

    /// Check whether a WAV file's spec can be streamed in this format
    pub fn matches(&self, spec: &WavSpec) -> bool {
        spec.channels == self.channels
            && spec.bits_per_sample == self.bits_per_sample
            && spec.sample_format == SampleFormat::Int
            && spec.sample_rate == self.sample_rate
    }
}

/// Convert a float sample in [-1, 1] to signed 16-bit
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert a signed 16-bit sample to float in [-1, 1]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_seconds() {
        let format = AudioFormat::mono_i16(48_000);
        assert_eq!(format.whole_seconds(47_999), 0);
        assert_eq!(format.whole_seconds(48_000), 1);
        assert_eq!(format.whole_seconds(96_001), 2);
        assert_eq!(format.bytes_per_frame(), 2);
    }

    #[test]
    fn test_spec_matching() {
        let format = AudioFormat::mono_i16(16_000);
        assert!(format.matches(&format.wav_spec()));

        let stereo = WavSpec {
            channels: 2,
            ..format.wav_spec()
        };
        assert!(!format.matches(&stereo));
        assert!(!AudioFormat::mono_i16(48_000).matches(&format.wav_spec()));
    }

    #[test]
    fn test_sample_conversion_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert!((i16_to_f32(i16::MAX) - 1.0).abs() < f32::EPSILON);
    }
}
