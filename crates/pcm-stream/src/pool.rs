//! Fixed pool of pre-allocated PCM buffers.
//!
//! Ownership of a buffer is expressed by who holds the [`PcmBuffer`] value:
//! - **Free**: parked in the pool's free list
//! - **Reader**: taken by the feed loop with [`BufferPool::acquire_free`] and being filled
//! - **InFlight**: moved into the output sink with [`BufferPool::submit`]
//!
//! The pool only keeps the counters so the invariant
//! `free + reader + in_flight == size` can be checked and reported. All storage is
//! allocated in [`BufferPool::new`]; nothing on the feed path allocates.

use pcm_stream_types::BufferCounts;

use crate::error::{Result, StreamError};
use crate::sink::{OutputSink, SubmitRejected};

/// One fixed-capacity buffer of interleaved PCM bytes.
#[derive(Debug)]
pub struct PcmBuffer {
    id: usize,
    data: Box<[u8]>,
    len: usize,
}

impl PcmBuffer {
    fn new(id: usize, capacity: usize) -> Self {
        Self {
            id,
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Slot index inside the owning pool.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes (`..len`).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Whole backing storage, for filling.
    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Set the valid length; clamped to capacity.
    pub(crate) fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.data.len());
        self.len = len.min(self.data.len());
    }
}

/// Pool of `size` buffers, each `capacity_bytes` long.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<PcmBuffer>,
    size: usize,
    capacity_bytes: usize,
    reader: usize,
    in_flight: usize,
}

impl BufferPool {
    /// Allocate every buffer up front.
    pub fn new(size: usize, capacity_bytes: usize) -> Result<Self> {
        if size == 0 {
            return Err(StreamError::InvalidConfig("pool needs at least one buffer".into()));
        }
        if capacity_bytes == 0 {
            return Err(StreamError::InvalidConfig("buffer capacity must be > 0".into()));
        }
        // Reverse so `pop` hands out buffer 0 first.
        let free = (0..size)
            .rev()
            .map(|id| PcmBuffer::new(id, capacity_bytes))
            .collect::<Vec<_>>();
        Ok(Self {
            free,
            size,
            capacity_bytes,
            reader: 0,
            in_flight: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Take a free buffer for filling. Never blocks; `None` means backpressure.
    pub fn acquire_free(&mut self) -> Option<PcmBuffer> {
        let mut buffer = self.free.pop()?;
        buffer.set_len(0);
        self.reader += 1;
        self.check();
        Some(buffer)
    }

    /// Return a buffer taken with `acquire_free` that was never submitted.
    pub fn restore(&mut self, buffer: PcmBuffer) {
        debug_assert!(self.reader > 0, "restore without acquire");
        self.reader = self.reader.saturating_sub(1);
        self.park(buffer);
    }

    /// Hand a filled buffer to `sink` (Reader → InFlight).
    ///
    /// On rejection the buffer comes back to the free list and the submit fails;
    /// the caller must not retry with the same audio.
    pub fn submit(&mut self, buffer: PcmBuffer, sink: &mut dyn OutputSink) -> Result<()> {
        debug_assert!(self.reader > 0, "submit without acquire");
        self.reader = self.reader.saturating_sub(1);
        self.in_flight += 1;
        match sink.submit(buffer) {
            Ok(()) => {
                self.check();
                Ok(())
            }
            Err(SubmitRejected { buffer, reason }) => {
                self.in_flight -= 1;
                self.park(buffer);
                Err(StreamError::Submit(reason))
            }
        }
    }

    /// Take back a buffer the output finished with (InFlight → Free).
    pub fn release(&mut self, buffer: PcmBuffer) -> Result<()> {
        if buffer.id >= self.size || buffer.capacity() != self.capacity_bytes {
            return Err(StreamError::InvalidState {
                op: "release",
                state: "buffer does not belong to this pool",
            });
        }
        if self.in_flight == 0 {
            return Err(StreamError::InvalidState {
                op: "release",
                state: "no buffers in flight",
            });
        }
        self.in_flight -= 1;
        self.park(buffer);
        Ok(())
    }

    pub fn counts(&self) -> BufferCounts {
        BufferCounts {
            free: self.free.len(),
            reader: self.reader,
            in_flight: self.in_flight,
        }
    }

    fn park(&mut self, mut buffer: PcmBuffer) {
        buffer.set_len(0);
        // Capacity was reserved in `new`; this never reallocates.
        self.free.push(buffer);
        self.check();
    }

    fn check(&self) {
        debug_assert_eq!(
            self.free.len() + self.reader + self.in_flight,
            self.size,
            "buffer ownership counts out of balance"
        );
    }
}
