//! Capability seam between the streaming engine and an audio output.
//!
//! The engine needs only a handful of operations from a device: create an
//! output for a format, register a completion callback, queue buffers, start
//! and stop, report a position, and tear down. Anything implementing these
//! traits can drive a session; tests use an in-memory recorder.

use crate::error::Result;
use crate::format::AudioFormat;
use crate::pool::PcmBuffer;
use crate::registry::CompletionHandle;

/// Factory for output sinks (engine + output mix + player in device terms).
pub trait OutputBackend {
    /// Create an output path able to queue up to `queue_depth` buffers of `format`.
    fn create_output(&self, format: AudioFormat, queue_depth: usize)
    -> Result<Box<dyn OutputSink>>;
}

/// A filled buffer the output refused, handed back to its owner.
#[derive(Debug)]
pub struct SubmitRejected {
    pub buffer: PcmBuffer,
    pub reason: String,
}

/// One live output path.
///
/// ## Callback contract
/// The sink reports each consumed buffer by calling
/// [`CompletionHandle::complete`] from its own thread, passing the buffer back.
/// It must never do so from inside `submit`, `set_playing` or `destroy`: those
/// run while the session is locked.
pub trait OutputSink: Send {
    /// Install the completion callback. Called once, before playback starts.
    fn register_completion(&mut self, handle: CompletionHandle) -> Result<()>;

    /// Queue a filled buffer. Ownership moves to the sink until completion.
    fn submit(&mut self, buffer: PcmBuffer) -> Result<(), SubmitRejected>;

    /// Start or stop consuming queued buffers.
    fn set_playing(&mut self, playing: bool) -> Result<()>;

    /// Playback position in milliseconds, if the output tracks one.
    fn position_ms(&self) -> Option<u64>;

    /// Stop the output and synchronously guarantee no further completion calls.
    ///
    /// Returns every buffer still queued so the pool can reclaim them.
    fn destroy(&mut self) -> Vec<PcmBuffer>;
}
