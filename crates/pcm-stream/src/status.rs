use pcm_stream_types::{BufferCounts, PlaybackEndReason, PlaybackState, StatusSnapshot};

use crate::format::AudioFormat;
use crate::source::StreamCursor;

/// Counters and outcome fields a session keeps alongside its state.
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    /// Bytes handed to the output.
    pub bytes_submitted: u64,
    /// Last position the output reported.
    pub position_ms: Option<u64>,
    pub end_reason: Option<PlaybackEndReason>,
    /// Display form of the failure that moved the session to `Error`.
    pub last_error: Option<String>,
    /// Events lost because the channel was full.
    pub dropped_events: u64,
}

/// Inputs for a snapshot that live outside the tracker.
pub(crate) struct SnapshotParts {
    pub state: PlaybackState,
    pub format: AudioFormat,
    pub cursor: StreamCursor,
    pub buffers: BufferCounts,
    pub buffer_capacity_bytes: usize,
}

impl StatusTracker {
    pub fn snapshot(&self, parts: SnapshotParts) -> StatusSnapshot {
        StatusSnapshot {
            state: parts.state,
            sample_rate: parts.format.sample_rate(),
            channels: parts.format.channels(),
            bits_per_sample: parts.format.bits_per_sample(),
            buffer_capacity_bytes: parts.buffer_capacity_bytes,
            bytes_consumed: parts.cursor.bytes_consumed(),
            bytes_submitted: self.bytes_submitted,
            exhausted: parts.cursor.is_exhausted(),
            buffers: parts.buffers,
            position_ms: self.position_ms,
            end_reason: self.end_reason,
            last_error: self.last_error.clone(),
            dropped_events: self.dropped_events,
        }
    }
}
