//! In-memory output used to drive sessions without audio hardware.
//!
//! Buffers queue up in submit order. Tests play the device thread by calling
//! [`MockBackend::complete_next`], which hands the oldest buffer back through
//! the registered completion handle.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender};
use pcm_stream::{
    AudioFormat, CompletionHandle, OutputBackend, OutputSink, PcmBuffer, PlaybackEvent,
    StreamError, SubmitRejected,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateOutput { queue_depth: usize },
    RegisterCompletion,
    Submit { buffer: usize, len: usize },
    SetPlaying(bool),
    Destroy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    CreateOutput,
    RegisterCompletion,
    SetPlaying,
    /// Reject the n-th submit (1-based).
    Submit(usize),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    queue: VecDeque<PcmBuffer>,
    played: Vec<u8>,
    submitted: Vec<u8>,
    submits: usize,
    completion: Option<CompletionHandle>,
    playing: bool,
    destroyed: bool,
}

/// Blocks `submit` until released, to hold a feed step open mid-callback.
struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

#[derive(Default)]
struct MockShared {
    state: Mutex<MockState>,
    gate: Mutex<Option<Gate>>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    shared: Arc<MockShared>,
    fail: Option<FailPoint>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(at: FailPoint) -> Self {
        Self {
            shared: Arc::default(),
            fail: Some(at),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// `(buffer id, length)` of every accepted submit, in order.
    pub fn submits(&self) -> Vec<(usize, usize)> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit { buffer, len } => Some((*buffer, *len)),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of every accepted buffer's bytes.
    pub fn submitted_bytes(&self) -> Vec<u8> {
        self.state().submitted.clone()
    }

    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Pop the oldest queued buffer as the device would once it finished playing.
    pub fn take_next(&self) -> Option<(PcmBuffer, CompletionHandle)> {
        let mut st = self.state();
        let buffer = st.queue.pop_front()?;
        st.played.extend_from_slice(buffer.as_bytes());
        let handle = st.completion.clone()?;
        Some((buffer, handle))
    }

    /// Finish the oldest buffer and run the completion callback on this thread.
    pub fn complete_next(&self) -> bool {
        match self.take_next() {
            Some((buffer, handle)) => {
                handle.complete(buffer);
                true
            }
            None => false,
        }
    }

    /// Make the next submit block until the returned sender fires.
    ///
    /// The returned receiver fires when a submit is waiting.
    pub fn arm_gate(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        *self.shared.gate.lock().unwrap() = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }
}

impl OutputBackend for MockBackend {
    fn create_output(
        &self,
        _format: AudioFormat,
        queue_depth: usize,
    ) -> pcm_stream::Result<Box<dyn OutputSink>> {
        self.state().calls.push(Call::CreateOutput { queue_depth });
        if self.fail == Some(FailPoint::CreateOutput) {
            return Err(StreamError::backend_init("engine", "simulated engine failure"));
        }
        Ok(Box::new(MockSink {
            shared: self.shared.clone(),
            fail: self.fail,
        }))
    }
}

struct MockSink {
    shared: Arc<MockShared>,
    fail: Option<FailPoint>,
}

impl MockSink {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.state.lock().unwrap()
    }
}

impl OutputSink for MockSink {
    fn register_completion(&mut self, handle: CompletionHandle) -> pcm_stream::Result<()> {
        let mut st = self.state();
        st.calls.push(Call::RegisterCompletion);
        if self.fail == Some(FailPoint::RegisterCompletion) {
            return Err(StreamError::Backend("simulated registration failure".into()));
        }
        st.completion = Some(handle);
        Ok(())
    }

    fn submit(&mut self, buffer: PcmBuffer) -> Result<(), SubmitRejected> {
        let gate = self.shared.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.send(()).unwrap();
            gate.release.recv().unwrap();
        }

        let mut st = self.state();
        st.submits += 1;
        if self.fail == Some(FailPoint::Submit(st.submits)) {
            return Err(SubmitRejected {
                buffer,
                reason: "simulated rejection".into(),
            });
        }
        st.calls.push(Call::Submit {
            buffer: buffer.id(),
            len: buffer.len(),
        });
        st.submitted.extend_from_slice(buffer.as_bytes());
        st.queue.push_back(buffer);
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) -> pcm_stream::Result<()> {
        let mut st = self.state();
        st.calls.push(Call::SetPlaying(playing));
        if playing && self.fail == Some(FailPoint::SetPlaying) {
            return Err(StreamError::Backend("simulated start failure".into()));
        }
        st.playing = playing;
        Ok(())
    }

    fn position_ms(&self) -> Option<u64> {
        // One byte per millisecond keeps the arithmetic obvious in tests.
        Some(self.state().played.len() as u64)
    }

    fn destroy(&mut self) -> Vec<PcmBuffer> {
        let mut st = self.state();
        st.calls.push(Call::Destroy);
        st.destroyed = true;
        st.playing = false;
        st.completion = None;
        st.queue.drain(..).collect()
    }
}

/// Source that yields `ok_bytes` zero bytes and then fails.
pub struct FailingSource {
    pub ok_bytes: usize,
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.ok_bytes == 0 {
            return Err(std::io::Error::other("simulated read fault"));
        }
        let n = self.ok_bytes.min(buf.len());
        buf[..n].fill(0);
        self.ok_bytes -= n;
        Ok(n)
    }
}

/// Deterministic test pattern of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn drain_events(rx: &Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    rx.try_iter().collect()
}
