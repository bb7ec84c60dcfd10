//! Buffered PCM streaming engine.
//!
//! A file is streamed to an audio output through a fixed pool of buffers. The
//! output reports each consumed buffer through a completion callback, which
//! refills it from the file and queues it again until the file ends.
//!
//! - [`source`]: sequential reader producing fixed-size chunks
//! - [`pool`]: pre-allocated buffers and their ownership accounting
//! - [`state`]: the playback lifecycle
//! - [`feed`]: one acquire/read/submit step
//! - [`session`]: the above wired together behind an owner handle
//! - [`sink`]: what an audio output must provide
//! - [`playback`] / [`device`]: a CPAL output (feature `cpal`)

pub mod config;
#[cfg(feature = "cpal")]
pub mod device;
pub mod error;
pub mod feed;
pub mod format;
#[cfg(feature = "cpal")]
pub mod playback;
pub mod player;
pub mod pool;
pub mod registry;
pub mod session;
pub mod sink;
pub mod source;
pub mod state;
mod status;

pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use format::AudioFormat;
pub use pcm_stream_types::{
    BufferCounts, FailureReason, PlaybackEndReason, PlaybackEvent, PlaybackState, StatusSnapshot,
};
pub use player::play_audio;
pub use pool::PcmBuffer;
pub use registry::{CompletionHandle, SessionId, SessionRegistry};
pub use session::PlaybackSession;
pub use sink::{OutputBackend, OutputSink, SubmitRejected};
