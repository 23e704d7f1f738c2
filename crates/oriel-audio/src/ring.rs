//! Lock-free single-producer/single-consumer byte ring
//!
//! One owned byte region, a producer-owned write index, a consumer-owned
//! read index and a single atomic byte count. The count is the only shared
//! word: the producer publishes written bytes with a release increment, the
//! consumer observes them with an acquire load (and the mirror-image pair
//! on the read side). Writes and reads copy in up to two segments around
//! the wrap point, never block, never spin, and return the bytes actually
//! transferred.
//!
//! Overflow is the producer seeing a short write; underflow is the consumer
//! seeing a short read. Both are left to the caller: the protocol side logs
//! overflow, the realtime side zero-pads underflow.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct RingInner {
    buffer: Box<[UnsafeCell<u8>]>,
    size: AtomicUsize,
}

// SAFETY: the buffer is shared between exactly one producer and one
// consumer. The producer only writes the free region, the consumer only
// reads the filled region, and the two regions never overlap because they
// are delimited by `size`, whose release/acquire pairs order the copies.
unsafe impl Sync for RingInner {}
unsafe impl Send for RingInner {}

impl RingInner {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn base(&self) -> *mut u8 {
        self.buffer.as_ptr() as *mut u8
    }
}

/// Create a ring of the given capacity in bytes
///
/// The two halves may live on different threads; each half owns its index.
#[must_use]
pub fn ring(capacity: usize) -> (Producer, Consumer) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    let inner = Arc::new(RingInner {
        buffer: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
        size: AtomicUsize::new(0),
    });
    (
        Producer { inner: Arc::clone(&inner), write: 0 },
        Consumer { inner, read: 0 },
    )
}

/// Writing half of the ring
pub struct Producer {
    inner: Arc<RingInner>,
    write: usize,
}

impl Producer {
    /// Ring capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Bytes currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.size.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy as much of `src` as fits, returning the bytes written
    pub fn write(&mut self, src: &[u8]) -> usize {
        let capacity = self.inner.capacity();
        let free = capacity - self.inner.size.load(Ordering::Acquire);

        let tail = capacity - self.write;
        let first = src.len().min(free).min(tail);
        // SAFETY: [write, write + first) lies inside the free region,
        // which the consumer does not touch (see RingInner).
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.inner.base().add(self.write), first);
        }

        let second = (src.len() - first).min(free - first);
        // SAFETY: as above, the wrapped region [0, second) is also free.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), self.inner.base(), second);
        }

        let written = first + second;
        self.write = (self.write + written) % capacity;
        self.inner.size.fetch_add(written, Ordering::Release);
        written
    }
}

/// Reading half of the ring
pub struct Consumer {
    inner: Arc<RingInner>,
    read: usize,
}

impl Consumer {
    /// Ring capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Bytes currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.size.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy up to `dst.len()` queued bytes out, returning the bytes read
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let capacity = self.inner.capacity();
        let avail = self.inner.size.load(Ordering::Acquire);

        let tail = capacity - self.read;
        let first = dst.len().min(avail).min(tail);
        // SAFETY: [read, read + first) lies inside the filled region,
        // which the producer does not touch (see RingInner).
        unsafe {
            std::ptr::copy_nonoverlapping(self.inner.base().add(self.read), dst.as_mut_ptr(), first);
        }

        let second = (dst.len() - first).min(avail - first);
        // SAFETY: as above for the wrapped region.
        unsafe {
            std::ptr::copy_nonoverlapping(self.inner.base(), dst.as_mut_ptr().add(first), second);
        }

        let read = first + second;
        self.read = (self.read + read) % capacity;
        self.inner.size.fetch_sub(read, Ordering::Release);
        read
    }
}
