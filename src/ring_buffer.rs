//! Fixed-capacity sample store shared by every decoded channel.

use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Circular FIFO of decoded samples that drops the **newest** value when full.
///
/// Once `capacity` samples are waiting, further writes are discarded until a
/// [`read`](RingBuffer::read) frees a slot.  Data that is already queued is never
/// overwritten, so a slow consumer sees a gap at the end of the stream rather
/// than a silently spliced one.
///
/// `head` is the slot of the most recent write and `tail` the slot of the most
/// recent read; both advance before they are used.
///
/// ```
/// # use muse_session::ring_buffer::RingBuffer;
/// let mut buf = RingBuffer::new(2);
/// buf.write(1.0);
/// buf.write(2.0);
/// buf.write(3.0); // full: dropped
/// assert_eq!(buf.read(), Some(1.0));
/// assert_eq!(buf.read(), Some(2.0));
/// assert_eq!(buf.read(), None);
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    full: bool,
    count: usize,
    last_write_ms: Option<u64>,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding up to `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            full: false,
            count: 0,
            last_write_ms: None,
        }
    }

    /// Append `value` unless the buffer is full, in which case it is dropped.
    pub fn write(&mut self, value: T) {
        if self.full {
            return;
        }
        self.head = self.next(self.head);
        self.slots[self.head] = Some(value);
        if self.head == self.tail {
            self.full = true;
        }
        self.count += 1;
        self.last_write_ms = Some(now_ms());
    }

    /// Remove and return the oldest sample, or `None` when empty.
    pub fn read(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        self.tail = self.next(self.tail);
        self.full = false;
        self.count -= 1;
        self.slots[self.tail].take()
    }

    fn next(&self, n: usize) -> usize {
        (n + 1) % self.slots.len()
    }

    /// Drain every queued sample, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.read())
    }

    /// Discard all queued samples and forget the last write time.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.head = 0;
        self.tail = 0;
        self.full = false;
        self.count = 0;
        self.last_write_ms = None;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Wall-clock time (ms since Unix epoch) of the last accepted write.
    ///
    /// Applies to the buffer as a whole, not to any individual sample.
    pub fn last_write_ms(&self) -> Option<u64> {
        self.last_write_ms
    }
}
