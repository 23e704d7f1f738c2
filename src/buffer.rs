//! Receive buffer for the framed transport stream
//!
//! A growable owned byte region whose logical contents always occupy the
//! prefix. The demuxer appends with one bounded read per transport wakeup
//! and discards whole records from the front once they are consumed.

use std::io::Read;

/// Free space guaranteed before each read
const MIN_HEADROOM: usize = 4096;

/// Growable append-only buffer with prefix discard
#[derive(Debug, Default)]
pub struct StreamBuffer {
    storage: Vec<u8>,
    size: usize,
}

impl StreamBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical contents
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.storage[..self.size]
    }

    /// Logical size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Append with one bounded read
    ///
    /// Doubles the capacity first when less than 4 KiB is free. Returns
    /// `Ok(0)` on end of stream; OS error semantics pass through.
    pub fn append_from(&mut self, source: &mut impl Read) -> std::io::Result<usize> {
        if self.storage.len() - self.size < MIN_HEADROOM {
            let mut capacity = self.storage.len().max(MIN_HEADROOM);
            while capacity - self.size < MIN_HEADROOM {
                capacity *= 2;
            }
            self.storage.resize(capacity, 0);
        }

        let read = source.read(&mut self.storage[self.size..])?;
        self.size += read;
        Ok(read)
    }

    /// Drop the first `count` bytes, shifting the tail down in place
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the logical size.
    pub fn discard(&mut self, count: usize) {
        assert!(count <= self.size, "discard beyond buffer contents");
        self.storage.copy_within(count..self.size, 0);
        self.size -= count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_discard() {
        let mut buffer = StreamBuffer::new();
        let mut source: &[u8] = b"abcdefgh";
        assert_eq!(buffer.append_from(&mut source).unwrap(), 8);
        assert_eq!(buffer.data(), b"abcdefgh");

        buffer.discard(3);
        assert_eq!(buffer.data(), b"defgh");
        buffer.discard(5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_eof_reports_zero() {
        let mut buffer = StreamBuffer::new();
        let mut source: &[u8] = b"";
        assert_eq!(buffer.append_from(&mut source).unwrap(), 0);
    }

    #[test]
    fn test_capacity_grows_for_headroom() {
        let mut buffer = StreamBuffer::new();
        let payload = vec![0x5a; 6000];
        let mut source: &[u8] = &payload;

        let mut received = 0;
        while received < payload.len() {
            let n = buffer.append_from(&mut source).unwrap();
            assert!(n > 0);
            received += n;
        }
        assert_eq!(buffer.len(), 6000);
        assert!(buffer.data().iter().all(|&b| b == 0x5a));
    }

    #[test]
    #[should_panic(expected = "discard beyond buffer contents")]
    fn test_discard_too_much_panics() {
        let mut buffer = StreamBuffer::new();
        buffer.discard(1);
    }
}
