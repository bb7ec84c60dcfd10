//! Playback session: the owner's handle and the shared core the output calls into.
//!
//! ## Threads
//! The owner drives `create`/`play`/`destroy` from its own thread. After `play`
//! primes the pipeline, every further feed cycle runs on the output's callback
//! thread through a [`CompletionHandle`]. Both sides go through one mutex around
//! [`SessionCore`]; each holds it for at most `pool_size` feed steps (a bounded
//! file read plus a queue push each), never across a wait.
//!
//! ## Teardown
//! `destroy` invalidates the registry slot, marks the core stopped, then tears
//! the output down *outside* the lock. Tearing down may wait for a callback
//! that is itself waiting on the lock; once it gets in, it sees `Stopped`,
//! returns its buffer to the pool and leaves.

use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use pcm_stream_types::{PlaybackEndReason, PlaybackEvent, PlaybackState, StatusSnapshot};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::feed::{FeedOutcome, feed_cycle};
use crate::format::AudioFormat;
use crate::pool::{BufferPool, PcmBuffer};
use crate::registry::{CompletionHandle, SessionId, SessionRegistry, SharedCore};
use crate::sink::{OutputBackend, OutputSink};
use crate::source::{BoxedSource, SourceReader};
use crate::state::StateMachine;
use crate::status::{SnapshotParts, StatusTracker};

pub(crate) fn lock_core(core: &Mutex<SessionCore>) -> MutexGuard<'_, SessionCore> {
    core.lock().unwrap_or_else(|e| e.into_inner())
}

/// State shared between the owner and the output's completion callback.
pub(crate) struct SessionCore {
    machine: StateMachine,
    format: AudioFormat,
    config: StreamConfig,
    reader: SourceReader<BoxedSource>,
    pool: Option<BufferPool>,
    sink: Option<Box<dyn OutputSink>>,
    events: Sender<PlaybackEvent>,
    status: StatusTracker,
}

impl SessionCore {
    fn new(
        reader: SourceReader<BoxedSource>,
        format: AudioFormat,
        config: StreamConfig,
        events: Sender<PlaybackEvent>,
    ) -> Self {
        Self {
            machine: StateMachine::default(),
            format,
            config,
            reader,
            pool: None,
            sink: None,
            events,
            status: StatusTracker::default(),
        }
    }

    fn emit(&mut self, event: PlaybackEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => self.status.dropped_events += 1,
        }
    }

    fn transition(&mut self, to: PlaybackState) -> Result<()> {
        let from = self.machine.advance(to)?;
        self.emit(PlaybackEvent::StateChanged { from, to });
        Ok(())
    }

    /// Record `err`, stop the output and move to `Error`. Returns `err` for propagation.
    fn fail(&mut self, err: StreamError) -> StreamError {
        if self.machine.state().is_terminal() {
            return err;
        }
        tracing::error!(error = %err, state = %self.machine.state(), "playback failed");
        let reason = err.failure_reason();
        self.status.last_error = Some(err.to_string());
        self.status.end_reason = Some(PlaybackEndReason::Error);
        self.reader.close();
        if let Some(sink) = self.sink.as_mut() {
            if let Err(stop_err) = sink.set_playing(false) {
                tracing::warn!(error = %stop_err, "failed to stop output after error");
            }
        }
        // Outcome before the terminal state change: waiters stop at the latter.
        self.emit(PlaybackEvent::Failed { reason });
        let _ = self.transition(PlaybackState::Error);
        err
    }

    fn prepare(&mut self, backend: &dyn OutputBackend, handle: CompletionHandle) -> Result<()> {
        self.machine.require("create", PlaybackState::Idle)?;

        let pool = BufferPool::new(self.config.pool_size, self.config.buffer_bytes(&self.format))?;
        let buffer_bytes = pool.capacity_bytes();
        self.pool = Some(pool);

        let sink = match open_output(backend, self.format, self.config.pool_size, handle) {
            Ok(sink) => sink,
            Err(err) => return Err(self.fail(err)),
        };
        self.sink = Some(sink);
        self.transition(PlaybackState::Prepared)?;
        tracing::info!(
            format = %self.format,
            buffers = self.config.pool_size,
            buffer_bytes,
            "output prepared"
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.machine.require("play", PlaybackState::Prepared)?;
        let Some(sink) = self.sink.as_mut() else {
            return Err(StreamError::InvalidState {
                op: "play",
                state: "no output",
            });
        };
        if let Err(err) = sink.set_playing(true) {
            return Err(self.fail(err));
        }
        self.transition(PlaybackState::Playing)?;

        // Prime: the output only calls back for buffers it has been given.
        if let Err(err) = self.run_feed() {
            return Err(self.fail(err));
        }
        Ok(())
    }

    /// Feed until the pool runs dry, the source ends, or the state leaves `Playing`.
    fn run_feed(&mut self) -> Result<()> {
        loop {
            if self.machine.state() != PlaybackState::Playing {
                return Ok(());
            }
            let (Some(pool), Some(sink)) = (self.pool.as_mut(), self.sink.as_mut()) else {
                return Err(StreamError::InvalidState {
                    op: "feed",
                    state: "no output",
                });
            };
            match feed_cycle(&mut self.reader, pool, sink.as_mut())? {
                FeedOutcome::Backpressure => return Ok(()),
                FeedOutcome::Submitted(bytes) => {
                    self.status.bytes_submitted += bytes as u64;
                    let total_bytes = self.status.bytes_submitted;
                    tracing::debug!(bytes, total_bytes, "enqueued buffer");
                    self.emit(PlaybackEvent::BufferSubmitted { bytes, total_bytes });
                }
                FeedOutcome::Exhausted => {
                    let total_bytes = self.reader.cursor().bytes_consumed();
                    tracing::info!(total_bytes, "end of audio stream");
                    self.emit(PlaybackEvent::Exhausted { total_bytes });
                    self.transition(PlaybackState::Draining)?;
                    self.finish_if_drained();
                    return Ok(());
                }
            }
        }
    }

    /// `Draining → Stopped` once the output holds no more buffers.
    fn finish_if_drained(&mut self) {
        if self.machine.state() != PlaybackState::Draining {
            return;
        }
        if self.pool.as_ref().is_some_and(|p| p.in_flight() > 0) {
            return;
        }
        self.reader.close();
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.set_playing(false) {
                tracing::warn!(error = %err, "failed to stop output after drain");
            }
        }
        self.status.end_reason = Some(PlaybackEndReason::Eof);
        let total_bytes = self.status.bytes_submitted;
        tracing::info!(total_bytes, "playback finished");
        self.emit(PlaybackEvent::Finished { total_bytes });
        let _ = self.transition(PlaybackState::Stopped);
    }

    /// Completion callback body: reclaim `buffer`, then refill or finish draining.
    pub(crate) fn on_complete(&mut self, buffer: PcmBuffer) {
        let Some(pool) = self.pool.as_mut() else {
            tracing::warn!("completion before the pool exists; buffer dropped");
            return;
        };
        if let Err(err) = pool.release(buffer) {
            tracing::warn!(error = %err, "completion with a foreign buffer ignored");
            return;
        }
        if let Some(sink) = self.sink.as_ref() {
            self.status.position_ms = sink.position_ms();
        }
        tracing::debug!(position_ms = ?self.status.position_ms, "buffer played");

        match self.machine.state() {
            PlaybackState::Playing => {
                if let Err(err) = self.run_feed() {
                    self.fail(err);
                }
            }
            PlaybackState::Draining => self.finish_if_drained(),
            _ => {}
        }
    }

    /// First half of `destroy`: stop and hand the output to the caller for teardown.
    fn retire(&mut self) -> Option<Box<dyn OutputSink>> {
        if self.machine.state() != PlaybackState::Stopped {
            self.status.end_reason.get_or_insert(PlaybackEndReason::Stopped);
            let _ = self.transition(PlaybackState::Stopped);
        }
        self.reader.close();
        self.sink.take()
    }

    /// Second half of `destroy`: take back what the output still held.
    fn reclaim(&mut self, buffers: Vec<PcmBuffer>) {
        let Some(pool) = self.pool.as_mut() else {
            return;
        };
        for buffer in buffers {
            if let Err(err) = pool.release(buffer) {
                tracing::warn!(error = %err, "output returned a foreign buffer");
            }
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        let mut snap = self.status.snapshot(SnapshotParts {
            state: self.machine.state(),
            format: self.format,
            cursor: self.reader.cursor(),
            buffers: self.pool.as_ref().map(|p| p.counts()).unwrap_or_default(),
            buffer_capacity_bytes: self.pool.as_ref().map_or(0, |p| p.capacity_bytes()),
        });
        if let Some(position) = self.sink.as_ref().and_then(|s| s.position_ms()) {
            snap.position_ms = Some(position);
        }
        snap
    }
}

/// Create the output path and register the completion callback.
fn open_output(
    backend: &dyn OutputBackend,
    format: AudioFormat,
    queue_depth: usize,
    handle: CompletionHandle,
) -> Result<Box<dyn OutputSink>> {
    let mut sink = backend
        .create_output(format, queue_depth)
        .map_err(|e| e.into_init("create output"))?;
    if let Err(err) = sink.register_completion(handle) {
        sink.destroy();
        return Err(err.into_init("register callback"));
    }
    Ok(sink)
}

/// Owner handle for one playback of one source.
///
/// Dropping the handle destroys the session.
pub struct PlaybackSession {
    id: SessionId,
    registry: Arc<SessionRegistry>,
    core: SharedCore,
    events: Receiver<PlaybackEvent>,
    format: AudioFormat,
    destroyed: bool,
}

impl PlaybackSession {
    /// Session over any byte source, registered in the global registry.
    pub fn new<R>(source: R, format: AudioFormat, config: StreamConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::new_in(SessionRegistry::global(), source, format, config)
    }

    /// Session over any byte source, registered in `registry`.
    pub fn new_in<R>(
        registry: Arc<SessionRegistry>,
        source: R,
        format: AudioFormat,
        config: StreamConfig,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::from_reader(registry, SourceReader::new(source).boxed(), format, config)
    }

    /// Session reading the PCM file at `path`.
    pub fn open(path: impl AsRef<Path>, format: AudioFormat, config: StreamConfig) -> Result<Self> {
        let reader = SourceReader::open(path.as_ref())?;
        Self::from_reader(SessionRegistry::global(), reader.boxed(), format, config)
    }

    fn from_reader(
        registry: Arc<SessionRegistry>,
        reader: SourceReader<BoxedSource>,
        format: AudioFormat,
        config: StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = crossbeam_channel::bounded(config.event_capacity);
        let core = Arc::new(Mutex::new(SessionCore::new(reader, format, config, tx)));
        let id = registry.insert(core.clone());
        tracing::debug!(session = %id, format = %format, "session created");
        Ok(Self {
            id,
            registry,
            core,
            events: rx,
            format,
            destroyed: false,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn state(&self) -> PlaybackState {
        lock_core(&self.core).machine.state()
    }

    pub fn status(&self) -> StatusSnapshot {
        lock_core(&self.core).snapshot()
    }

    /// Receiver for session events. Clones share one queue.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events.clone()
    }

    /// `Idle → Prepared`: allocate the pool, create the output and register the callback.
    ///
    /// Any backend failure leaves the session in `Error` and returns `BackendInit`.
    pub fn create(&mut self, backend: &dyn OutputBackend) -> Result<()> {
        let handle = CompletionHandle::new(self.registry.clone(), self.id);
        lock_core(&self.core).prepare(backend, handle)
    }

    /// `Prepared → Playing`: start the output and prime the pipeline.
    ///
    /// Returns as soon as the first buffers are queued; playback continues on
    /// the output's thread.
    pub fn play(&mut self) -> Result<()> {
        lock_core(&self.core).start()
    }

    /// Stop playback and release the output. Idempotent.
    ///
    /// When this returns, the output has been torn down and no completion
    /// callback is running or will run against this session.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.registry.remove(self.id);

        let sink = lock_core(&self.core).retire();
        if let Some(mut sink) = sink {
            let queued = sink.destroy();
            drop(sink);
            lock_core(&self.core).reclaim(queued);
        }
        tracing::info!(session = %self.id, "session destroyed");
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
