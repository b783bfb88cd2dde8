// GyroWatch — Streaming Ring Buffer
//
// Fixed-capacity circular buffer bridging the sensor drain to its consumers.
// Overwrite-on-full: when a reader falls behind, its oldest unread sample is
// silently replaced by the newest one. This favours freshness over
// completeness — a deliberate trade-off for live visualisation, where stale
// samples are worth less than current ones. See the overflow test below.
//
// Single writer, any number of independent readers, all on one thread. The
// handles are reference-counted views (`Rc`), so the whole structure is
// `!Send` by construction — sharing a buffer or a reader across threads is
// rejected at compile time rather than being a documented precondition.

use std::cell::RefCell;
use std::rc::Rc;

struct Inner<T, const N: usize> {
    slots: [T; N],
    write: usize,        // next free slot
    pending: Vec<usize>, // unread count per reader, each clamped at N
}

/// Fixed-size circular buffer with independent per-reader cursors.
///
/// All storage is allocated once at construction; `append` and `read` never
/// touch the heap.
pub struct RingBuffer<T, const N: usize> {
    inner: Rc<RefCell<Inner<T, N>>>,
}

/// Read handle bound to one [`RingBuffer`]. Tracks its own backlog; other
/// readers on the same buffer advance independently.
pub struct Reader<T, const N: usize> {
    inner: Rc<RefCell<Inner<T, N>>>,
    id: usize,
}

impl<T: Clone + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        assert!(N > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: Rc::new(RefCell::new(Inner {
                slots: core::array::from_fn(|_| T::default()),
                write: 0,
                pending: Vec::new(),
            })),
        }
    }

    /// Write one element at the write cursor and advance it.
    ///
    /// Every registered reader's backlog grows by one, capped at N — a
    /// reader already N behind loses its oldest sample without any error.
    pub fn append(&mut self, value: T) {
        let mut inner = self.inner.borrow_mut();
        let write = inner.write;
        inner.slots[write] = value;
        inner.write = (write + 1) % N;
        for count in &mut inner.pending {
            if *count < N {
                *count += 1;
            }
        }
    }

    /// Register a new reader, starting with an empty backlog.
    pub fn reader(&self) -> Reader<T, N> {
        let mut inner = self.inner.borrow_mut();
        inner.pending.push(0);
        Reader {
            inner: Rc::clone(&self.inner),
            id: inner.pending.len() - 1,
        }
    }
}

impl<T: Clone + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, const N: usize> Reader<T, N> {
    /// Number of elements appended since this reader last caught up.
    pub fn count(&self) -> usize {
        self.inner.borrow().pending[self.id]
    }

    /// Take the oldest unread element.
    ///
    /// Callers must check [`count`](Self::count) first; reading an empty
    /// backlog is a caller bug and fails fast.
    pub fn read(&mut self) -> T {
        let mut inner = self.inner.borrow_mut();
        let pending = inner.pending[self.id];
        assert!(pending > 0, "read() called on an empty reader");
        let pos = (inner.write + N - pending) % N;
        inner.pending[self.id] = pending - 1;
        inner.slots[pos].clone()
    }

    /// Drain the current backlog, oldest first.
    pub fn consume(&mut self, mut callback: impl FnMut(T)) {
        while self.count() > 0 {
            callback(self.read());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_counts() {
        let mut rb: RingBuffer<u32, 8> = RingBuffer::new();
        let mut reader = rb.reader();

        for i in 0..8 {
            rb.append(i);
        }
        assert_eq!(reader.count(), 8);

        for i in 0..8 {
            assert_eq!(reader.read(), i);
        }
        assert_eq!(reader.count(), 0);
    }

    #[test]
    fn overflow_drops_oldest_for_lagging_reader() {
        let mut rb: RingBuffer<f32, 4> = RingBuffer::new();
        let mut reader = rb.reader();

        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            rb.append(v);
        }

        // The fifth append overwrote 1.0 before the reader got to it.
        assert_eq!(reader.count(), 4);
        let mut seen = Vec::new();
        reader.consume(|v| seen.push(v));
        assert_eq!(seen, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn readers_advance_independently() {
        let mut rb: RingBuffer<u8, 16> = RingBuffer::new();
        let mut fast = rb.reader();
        let mut slow = rb.reader();

        rb.append(10);
        rb.append(20);
        assert_eq!(fast.read(), 10);
        assert_eq!(fast.read(), 20);

        rb.append(30);
        assert_eq!(fast.count(), 1);
        assert_eq!(slow.count(), 3);
        assert_eq!(slow.read(), 10);
        assert_eq!(fast.read(), 30);
    }

    #[test]
    fn late_reader_starts_empty() {
        let mut rb: RingBuffer<u8, 4> = RingBuffer::new();
        rb.append(1);
        let reader = rb.reader();
        assert_eq!(reader.count(), 0);
    }

    #[test]
    #[should_panic(expected = "empty reader")]
    fn reading_empty_backlog_panics() {
        let rb: RingBuffer<u8, 4> = RingBuffer::new();
        let mut reader = rb.reader();
        reader.read();
    }

    #[test]
    fn consume_interleaved_with_appends() {
        let mut rb: RingBuffer<u32, 8> = RingBuffer::new();
        let mut reader = rb.reader();

        let mut seen = Vec::new();
        for round in 0..3 {
            for i in 0..4 {
                rb.append(round * 4 + i);
            }
            reader.consume(|v| seen.push(v));
        }
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }
}
