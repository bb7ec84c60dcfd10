use std::path::PathBuf;

use anyhow::{Context, Result};
use pcm_stream::{AudioFormat, StreamConfig};

use crate::cli::EventOutput;

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub device: Option<String>,
    pub format: AudioFormat,
    pub stream: StreamConfig,
    pub events: EventOutput,
}

impl PlayConfig {
    /// Validate the raw CLI values.
    pub fn new(
        path: PathBuf,
        device: Option<String>,
        (rate, channels, bits): (u32, u16, u16),
        (buffers, buffer_ms): (usize, u32),
        events: EventOutput,
    ) -> Result<Self> {
        let format = AudioFormat::new(rate, channels, bits).context("audio format")?;
        let stream = StreamConfig {
            pool_size: buffers,
            buffer_ms,
            ..StreamConfig::default()
        };
        stream.validate().context("stream config")?;
        Ok(Self {
            path,
            device,
            format,
            stream,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_cli_values() {
        let cfg = PlayConfig::new(
            "a.pcm".into(),
            None,
            (48_000, 1, 24),
            (2, 20),
            EventOutput::Json,
        )
        .unwrap();
        assert_eq!(cfg.format.frame_bytes(), 3);
        assert_eq!(cfg.stream.pool_size, 2);
        assert_eq!(cfg.stream.buffer_bytes(&cfg.format), 960 * 3);
    }

    #[test]
    fn rejects_bad_format_and_pool() {
        assert!(
            PlayConfig::new("a".into(), None, (44_100, 6, 16), (3, 40), EventOutput::Log).is_err()
        );
        assert!(
            PlayConfig::new("a".into(), None, (44_100, 2, 16), (0, 40), EventOutput::Log).is_err()
        );
        assert!(
            PlayConfig::new(
                "a".into(),
                None,
                (44_100, 2, 16),
                (3, 4_000_000_000),
                EventOutput::Log
            )
            .is_err()
        );
    }
}
