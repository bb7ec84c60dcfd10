//! PCM stream format and the byte arithmetic derived from it.

use crate::error::{Result, StreamError};

/// Layout of the raw interleaved PCM input.
///
/// Samples are little-endian; 8-bit samples are unsigned, wider ones signed.
/// Fixed once a session is prepared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(StreamError::InvalidFormat("sample rate must be > 0".into()));
        }
        if !matches!(channels, 1 | 2) {
            return Err(StreamError::InvalidFormat(format!(
                "unsupported channel count {channels} (expected 1 or 2)"
            )));
        }
        if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(StreamError::InvalidFormat(format!(
                "unsupported bit depth {bits_per_sample} (expected 8, 16, 24 or 32)"
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
        })
    }

    /// 44.1 kHz, stereo, 16-bit.
    pub fn cd_quality() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Stride of one interleaved frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }

    /// Bytes covering `ms` of audio, rounded down to whole frames (at least one frame).
    pub fn bytes_for_duration(&self, ms: u32) -> usize {
        let frames = (u64::from(self.sample_rate) * u64::from(ms) / 1000).max(1);
        (frames as usize).saturating_mul(self.frame_bytes())
    }

    /// Playback time represented by `bytes` of this format.
    pub fn duration_ms(&self, bytes: u64) -> u64 {
        let frames = bytes / self.frame_bytes() as u64;
        frames.saturating_mul(1000) / u64::from(self.sample_rate)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_layouts() {
        assert!(AudioFormat::new(0, 2, 16).is_err());
        assert!(AudioFormat::new(44_100, 3, 16).is_err());
        assert!(AudioFormat::new(44_100, 0, 16).is_err());
        assert!(AudioFormat::new(44_100, 2, 12).is_err());
        assert!(AudioFormat::new(48_000, 1, 24).is_ok());
    }

    #[test]
    fn cd_quality_second_is_176400_bytes() {
        let format = AudioFormat::cd_quality();
        assert_eq!(format.frame_bytes(), 4);
        assert_eq!(format.bytes_per_second(), 176_400);
        assert_eq!(format.bytes_for_duration(1000), 176_400);
    }

    #[test]
    fn duration_rounds_to_whole_frames() {
        let format = AudioFormat::new(48_000, 2, 24).unwrap();
        assert_eq!(format.frame_bytes(), 6);
        assert_eq!(format.bytes_for_duration(10), 480 * 6);
        // Sub-frame durations still yield one frame.
        assert_eq!(format.bytes_for_duration(0), 6);
    }

    #[test]
    fn duration_ms_from_bytes() {
        let format = AudioFormat::cd_quality();
        assert_eq!(format.duration_ms(176_400), 1000);
        assert_eq!(format.duration_ms(88_200), 500);
        assert_eq!(format.duration_ms(3), 0);
    }
}
