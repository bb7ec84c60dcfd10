use crate::error::{Result, StreamError};
use crate::format::AudioFormat;

/// Longest audio a single buffer may hold.
pub const MAX_BUFFER_MS: u32 = 10_000;

/// Streaming engine tuning parameters.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Number of pre-allocated buffers (one playing while the next fills needs at least 2).
    pub pool_size: usize,
    /// Audio duration held by each buffer.
    ///
    /// Bounds playback-start latency and the blocking read done per feed cycle.
    pub buffer_ms: u32,
    /// Capacity of the bounded event channel; events past it are dropped.
    pub event_capacity: usize,
}

impl Default for StreamConfig {
    /// Short buffers with one spare, suitable for most devices.
    fn default() -> Self {
        Self {
            pool_size: 3,
            buffer_ms: 40,
            event_capacity: 64,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StreamError::InvalidConfig("pool_size must be >= 1".into()));
        }
        if !(1..=MAX_BUFFER_MS).contains(&self.buffer_ms) {
            return Err(StreamError::InvalidConfig(format!(
                "buffer_ms must be in 1..={MAX_BUFFER_MS}"
            )));
        }
        if self.event_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "event_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Fixed capacity of each pool buffer for `format`.
    pub fn buffer_bytes(&self, format: &AudioFormat) -> usize {
        format.bytes_for_duration(self.buffer_ms)
    }
}
