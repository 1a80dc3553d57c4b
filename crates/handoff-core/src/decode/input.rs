//! Compressed-input staging buffer
//!
//! The decoder works on whole frames, and frames straddle read boundaries.
//! Every refill first moves the unconsumed tail to the front of the buffer,
//! then appends fresh bytes behind it.

use std::io::{self, Read};

/// Default staging size in bytes (a bit more than one maximum-size frame
/// plus the next header)
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 2100;

/// Staging buffer between a byte source and the decoder
pub struct InputBuffer {
    data: Box<[u8]>,
    /// End of valid data
    len: usize,
    /// Start of unconsumed data
    pos: usize,
    /// Set once a refill read zero bytes
    eof: bool,
}

impl InputBuffer {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Input buffer size must be non-zero");
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            len: 0,
            pos: 0,
            eof: false,
        }
    }

    /// Staging size in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes read but not yet consumed
    #[inline]
    pub fn pending(&self) -> &[u8] {
        &self.data[self.pos..self.len]
    }

    /// Length of [`pending`](Self::pending)
    #[inline]
    pub fn tail_len(&self) -> usize {
        self.len - self.pos
    }

    /// Mark `n` pending bytes as consumed (clamped to what is pending)
    #[inline]
    pub fn consume(&mut self, n: usize) {
        self.pos += n.min(self.tail_len());
    }

    /// Whether the last refill hit end of stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Forget everything (new session)
    pub fn clear(&mut self) {
        self.len = 0;
        self.pos = 0;
        self.eof = false;
    }

    /// Carry the tail to the front and fill the rest from `source`
    ///
    /// Reads until the buffer is full or the source reports end of stream.
    /// Returns the number of fresh bytes; zero means end of stream.
    pub fn refill<R: Read + ?Sized>(&mut self, source: &mut R) -> io::Result<usize> {
        let mut tail = self.tail_len();
        if tail == self.capacity() {
            // A full buffer the decoder could not make progress on would
            // otherwise read zero fresh bytes forever
            log::warn!(
                "Input buffer full with no decodable frame, dropping {} bytes",
                tail
            );
            self.pos = self.len;
            tail = 0;
        }

        self.data.copy_within(self.pos..self.len, 0);
        self.pos = 0;
        self.len = tail;

        let mut fresh = 0;
        while self.len < self.capacity() {
            match source.read(&mut self.data[self.len..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.len += n;
                    fresh += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if fresh == 0 {
            self.eof = true;
        }
        Ok(fresh)
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_BUFFER_SIZE)
    }
}

impl std::fmt::Debug for InputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBuffer")
            .field("capacity", &self.capacity())
            .field("pending", &self.tail_len())
            .field("eof", &self.eof)
            .finish()
    }
}
