//! Sequential reader over a raw PCM byte stream.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::{Result, StreamError};
use crate::pool::PcmBuffer;

/// Read progress over the source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamCursor {
    bytes_consumed: u64,
    exhausted: bool,
}

impl StreamCursor {
    /// Total bytes read so far; never decreases.
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Set once, by the first zero-byte read; never cleared.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Fills pool buffers from a byte source, front to back.
///
/// Only the feed loop reads, so no internal locking is needed; the reader just
/// has to be `Send` because the feed loop moves to the output's thread after priming.
pub struct SourceReader<R> {
    inner: Option<R>,
    cursor: StreamCursor,
}

impl SourceReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(file))
    }
}

/// Type-erased reader stored inside a session.
pub type BoxedSource = Box<dyn Read + Send>;

impl<R: Read> SourceReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            cursor: StreamCursor::default(),
        }
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Fill `buffer` with up to its capacity, returning the byte count.
    ///
    /// Short reads from the underlying source are retried until the buffer is
    /// full or the source ends, so only the final chunk is shorter than capacity.
    /// `Ok(0)` is end of stream; once returned, every later call returns it too.
    pub fn read(&mut self, buffer: &mut PcmBuffer) -> Result<usize> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(StreamError::InvalidState {
                op: "read",
                state: "source closed",
            });
        };
        buffer.set_len(0);
        if self.cursor.exhausted {
            return Ok(0);
        }

        let dst = buffer.storage_mut();
        let mut filled = 0usize;
        let outcome = loop {
            if filled == dst.len() {
                break Ok(());
            }
            match inner.read(&mut dst[filled..]) {
                Ok(0) => break Ok(()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        self.cursor.bytes_consumed += filled as u64;
        outcome?;

        buffer.set_len(filled);
        if filled == 0 {
            self.cursor.exhausted = true;
        }
        Ok(filled)
    }

    /// Erase the source type, keeping the cursor.
    pub fn boxed(self) -> SourceReader<BoxedSource>
    where
        R: Send + 'static,
    {
        SourceReader {
            inner: self.inner.map(|r| Box::new(r) as BoxedSource),
            cursor: self.cursor,
        }
    }

    /// Release the underlying source. Later reads fail with `InvalidState`.
    pub fn close(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use std::io::Cursor;

    /// Yields at most `chunk` bytes per call, with one `Interrupted` up front.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct Faulty;

    impl Read for Faulty {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("bad sector"))
        }
    }

    #[test]
    fn reads_fixed_chunks_then_zero() {
        let mut pool = BufferPool::new(1, 4).unwrap();
        let mut buf = pool.acquire_free().unwrap();
        let mut reader = SourceReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5, 6]));

        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(buf.as_bytes(), &[5, 6]);
        assert!(!reader.cursor().is_exhausted());
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.cursor().is_exhausted());
        assert_eq!(reader.cursor().bytes_consumed(), 6);
    }

    #[test]
    fn exhaustion_is_sticky() {
        let mut pool = BufferPool::new(1, 4).unwrap();
        let mut buf = pool.acquire_free().unwrap();
        let mut reader = SourceReader::new(Cursor::new(Vec::<u8>::new()));
        for _ in 0..3 {
            assert_eq!(reader.read(&mut buf).unwrap(), 0);
            assert!(reader.cursor().is_exhausted());
        }
    }

    #[test]
    fn short_reads_are_coalesced() {
        let mut pool = BufferPool::new(1, 8).unwrap();
        let mut buf = pool.acquire_free().unwrap();
        let mut reader = SourceReader::new(Trickle {
            data: (0u8..10).collect(),
            pos: 0,
            chunk: 3,
            interrupted: false,
        });
        assert_eq!(reader.read(&mut buf).unwrap(), 8);
        assert_eq!(buf.as_bytes(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn read_fault_is_io_error() {
        let mut pool = BufferPool::new(1, 8).unwrap();
        let mut buf = pool.acquire_free().unwrap();
        let mut reader = SourceReader::new(Faulty);
        assert!(matches!(reader.read(&mut buf), Err(StreamError::Io(_))));
        assert!(!reader.cursor().is_exhausted());
    }

    #[test]
    fn read_after_close_is_invalid_state() {
        let mut pool = BufferPool::new(1, 8).unwrap();
        let mut buf = pool.acquire_free().unwrap();
        let mut reader = SourceReader::new(Cursor::new(vec![0u8; 4]));
        reader.close();
        assert!(!reader.is_open());
        assert!(matches!(
            reader.read(&mut buf),
            Err(StreamError::InvalidState { op: "read", .. })
        ));
    }

    #[test]
    fn open_reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[9u8; 10]).unwrap();
        let mut reader = SourceReader::open(file.path()).unwrap();
        let mut pool = BufferPool::new(1, 16).unwrap();
        let mut buf = pool.acquire_free().unwrap();
        assert_eq!(reader.read(&mut buf).unwrap(), 10);
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceReader::open(dir.path().join("missing.pcm")).err().unwrap();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
