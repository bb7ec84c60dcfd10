use serde::{Deserialize, Serialize};

/// Lifecycle state of a playback session.
///
/// `Stopped` and `Error` are terminal; only `destroy` is meaningful afterwards.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Session object exists but no output path has been created yet.
    #[default]
    Idle,
    /// Output path created and completion callback registered.
    Prepared,
    /// Device is consuming buffers; completions refill the pipeline.
    Playing,
    /// Source exhausted; waiting for in-flight buffers to finish.
    Draining,
    /// Resources released.
    Stopped,
    /// Unrecoverable failure; no further feed cycles run.
    Error,
}

impl PlaybackState {
    /// `true` for `Stopped` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Stopped | PlaybackState::Error)
    }

    /// Lower-case label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Prepared => "prepared",
            PlaybackState::Playing => "playing",
            PlaybackState::Draining => "draining",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Error => "error",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of the failure that moved a session to [`PlaybackState::Error`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Output engine, player or callback registration failed.
    BackendInit,
    /// The source file could not be read.
    Io,
    /// The output rejected a filled buffer.
    Submit,
    /// The output failed to start or stop.
    Backend,
}

/// Reason why playback ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Every byte of the source was played.
    Eof,
    /// A failure interrupted playback.
    Error,
    /// The session was destroyed by its owner.
    Stopped,
}

/// Notifications emitted by a session, from the controlling thread or the
/// backend's completion thread.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    /// A filled buffer was handed to the output.
    BufferSubmitted {
        bytes: usize,
        total_bytes: u64,
    },
    /// The source returned end of stream.
    Exhausted { total_bytes: u64 },
    /// Every submitted buffer was played and the session stopped.
    Finished { total_bytes: u64 },
    Failed { reason: FailureReason },
}

/// Buffer ownership counts; `free + reader + in_flight` always equals the pool size.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferCounts {
    pub free: usize,
    pub reader: usize,
    pub in_flight: usize,
}

impl BufferCounts {
    pub fn total(&self) -> usize {
        self.free + self.reader + self.in_flight
    }
}

/// Point-in-time status of a playback session.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PlaybackState,
    /// Source sample rate (Hz).
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Fixed capacity of every pool buffer.
    pub buffer_capacity_bytes: usize,
    /// Bytes read from the source so far.
    pub bytes_consumed: u64,
    /// Bytes handed to the output so far.
    pub bytes_submitted: u64,
    /// Whether the source has reported end of stream.
    pub exhausted: bool,
    pub buffers: BufferCounts,
    /// Playback position reported by the output, when it has one.
    pub position_ms: Option<u64>,
    pub end_reason: Option<PlaybackEndReason>,
    /// Display form of the failure that ended the session.
    pub last_error: Option<String>,
    /// Events not delivered because the event channel was full.
    pub dropped_events: u64,
}
