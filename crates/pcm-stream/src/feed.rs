//! One step of the completion-driven feed loop.

use std::io::Read;

use crate::error::Result;
use crate::pool::BufferPool;
use crate::sink::OutputSink;
use crate::source::SourceReader;

/// What a single feed cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedOutcome {
    /// No free buffer; nothing changed.
    Backpressure,
    /// A buffer with this many bytes went to the output.
    Submitted(usize),
    /// The source is at end of stream; nothing was submitted.
    Exhausted,
}

/// Acquire a free buffer, fill it from `reader` and submit it to `sink`.
///
/// On a read or submit failure the buffer is back in the free list before the
/// error is returned. No allocation happens here.
pub fn feed_cycle<R: Read>(
    reader: &mut SourceReader<R>,
    pool: &mut BufferPool,
    sink: &mut dyn OutputSink,
) -> Result<FeedOutcome> {
    let Some(mut buffer) = pool.acquire_free() else {
        return Ok(FeedOutcome::Backpressure);
    };

    let read = match reader.read(&mut buffer) {
        Ok(n) => n,
        Err(err) => {
            pool.restore(buffer);
            return Err(err);
        }
    };
    if read == 0 {
        pool.restore(buffer);
        return Ok(FeedOutcome::Exhausted);
    }

    pool.submit(buffer, sink)?;
    Ok(FeedOutcome::Submitted(read))
}
