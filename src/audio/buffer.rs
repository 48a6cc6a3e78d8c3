//! Fixed-capacity blocking ring buffer for raw PCM bytes.
//!
//! [`ByteRing`] decouples each producer/consumer pair in the capture
//! pipeline: the hardware callback fills the raw ring, the resampler task
//! drains it and fills the resampled ring, and the wake-word watcher or the
//! session pull loop drains that in turn.
//!
//! Unlike a lossy scratch buffer, a `ByteRing` never overwrites unread data.
//! A full ring blocks the writer (bounded by the caller's timeout) and an
//! empty ring blocks the reader — backpressure *is* the flow control.
//!
//! # Example
//!
//! ```rust
//! use voicegate::audio::ByteRing;
//!
//! let ring = ByteRing::new(8);
//! assert_eq!(ring.write(&[1, 2, 3], None), 3);
//!
//! let mut buf = [0u8; 3];
//! assert_eq!(ring.read(&mut buf, None), 3);
//! assert_eq!(buf, [1, 2, 3]);
//! ```

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// ByteRing
// ---------------------------------------------------------------------------

struct RingInner {
    buf: Vec<u8>,
    /// Index of the oldest unread byte.
    head: usize,
    /// Number of unread bytes (≤ capacity).
    len: usize,
    /// Set by [`ByteRing::close`]; readers drain what is left, then get 0.
    closed: bool,
}

/// A fixed-capacity circular byte queue with blocking `write`/`read`.
///
/// Intended for one producer and one consumer, though the internal lock
/// makes any access pattern memory-safe.
///
/// ## Blocking contract
///
/// * [`write`](Self::write) blocks while the ring is full, up to the given
///   timeout, and writes at most as many bytes as fit before the deadline.
/// * [`read`](Self::read) blocks until the *entire* destination slice can be
///   filled, the deadline passes, or the ring is closed.  A return of `0`
///   means "closed and drained" or "timed out with nothing available" —
///   callers treat it as end-of-stream.
/// * A timeout of `None` blocks indefinitely.
pub struct ByteRing {
    inner: Mutex<RingInner>,
    /// Signalled when bytes become available (or the ring closes).
    readable: Condvar,
    /// Signalled when space becomes available (or the ring closes).
    writable: Condvar,
    capacity: usize,
}

impl ByteRing {
    /// Create a ring with the given `capacity` in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ByteRing capacity must be > 0");
        Self {
            inner: Mutex::new(RingInner {
                buf: vec![0; capacity],
                head: 0,
                len: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    /// Append `data`, blocking for free space up to `timeout`.
    ///
    /// Returns the number of bytes actually written.  A short write means
    /// the deadline passed (or the ring was closed) while the ring was
    /// still full; already-written bytes stay in the ring.
    pub fn write(&self, data: &[u8], timeout: Option<Duration>) -> usize {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock().unwrap();
        let mut written = 0;

        while written < data.len() {
            if inner.closed {
                break;
            }
            let free = self.capacity - inner.len;
            if free == 0 {
                match wait(&self.writable, inner, deadline) {
                    Some(guard) => inner = guard,
                    None => return written, // deadline passed
                }
                continue;
            }

            let n = free.min(data.len() - written);
            let tail = (inner.head + inner.len) % self.capacity;
            let first = n.min(self.capacity - tail);
            inner.buf[tail..tail + first].copy_from_slice(&data[written..written + first]);
            let rest = n - first;
            if rest > 0 {
                inner.buf[..rest].copy_from_slice(&data[written + first..written + n]);
            }
            inner.len += n;
            written += n;
            self.readable.notify_one();
        }

        written
    }

    /// Fill `buf`, blocking until enough bytes arrive, the deadline passes,
    /// or the ring is closed.
    ///
    /// Returns the number of bytes copied: `buf.len()` on a full read, a
    /// partial count when the ring closed or timed out with some data
    /// buffered, and `0` when nothing was available at all.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        // A request larger than the ring can ever hold is capped at capacity.
        let want = buf.len().min(self.capacity);
        let mut inner = self.inner.lock().unwrap();

        // Wait for a full chunk unless the ring closes first.
        while inner.len < want && !inner.closed {
            match wait(&self.readable, inner, deadline) {
                Some(guard) => inner = guard,
                None => {
                    // Deadline passed: hand over whatever is buffered.
                    inner = self.inner.lock().unwrap();
                    break;
                }
            }
        }

        let n = inner.len.min(buf.len());
        for b in buf[..n].iter_mut() {
            *b = inner.buf[inner.head];
            inner.head = (inner.head + 1) % self.capacity;
        }
        inner.len -= n;
        if n > 0 {
            self.writable.notify_one();
        }
        n
    }

    /// Close the ring: wake every blocked reader and writer.
    ///
    /// Subsequent reads drain the remaining bytes and then return `0`;
    /// subsequent writes return short.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Discard all unread bytes.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.head = 0;
        inner.len = 0;
        self.writable.notify_all();
    }

    /// Number of unread bytes currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    /// Returns `true` when no unread bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of bytes the ring can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

/// Block on `cvar` until notified or `deadline` passes.
///
/// Returns `None` when the deadline has passed; the caller re-acquires the
/// lock itself if it still needs the buffered state.
fn wait<'a>(
    cvar: &Condvar,
    guard: std::sync::MutexGuard<'a, RingInner>,
    deadline: Option<Instant>,
) -> Option<std::sync::MutexGuard<'a, RingInner>> {
    match deadline {
        None => Some(cvar.wait(guard).unwrap()),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = cvar.wait_timeout(guard, deadline - now).unwrap();
            if result.timed_out() && Instant::now() >= deadline {
                drop(guard);
                None
            } else {
                Some(guard)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Option<Duration> = Some(Duration::from_millis(20));

    // ---- Basic write / read ------------------------------------------------

    #[test]
    fn write_then_read_round_trip() {
        let ring = ByteRing::new(16);
        assert_eq!(ring.write(&[1, 2, 3, 4], None), 4);
        assert_eq!(ring.len(), 4);

        let mut buf = [0u8; 4];
        assert_eq!(ring.read(&mut buf, None), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn fifo_order_across_wrap_around() {
        let ring = ByteRing::new(4);
        assert_eq!(ring.write(&[1, 2, 3], SHORT), 3);

        let mut buf = [0u8; 2];
        assert_eq!(ring.read(&mut buf, SHORT), 2);
        assert_eq!(buf, [1, 2]);

        // Head is now at index 2 — this write wraps.
        assert_eq!(ring.write(&[4, 5, 6], SHORT), 3);

        let mut buf = [0u8; 4];
        assert_eq!(ring.read(&mut buf, SHORT), 4);
        assert_eq!(buf, [3, 4, 5, 6]);
    }

    // ---- Timeouts ----------------------------------------------------------

    #[test]
    fn read_from_empty_ring_times_out_with_zero() {
        let ring = ByteRing::new(8);
        let mut buf = [0u8; 4];
        assert_eq!(ring.read(&mut buf, SHORT), 0);
    }

    #[test]
    fn write_to_full_ring_times_out_short() {
        let ring = ByteRing::new(4);
        assert_eq!(ring.write(&[1, 2, 3, 4], SHORT), 4);
        // Ring is full — only the timeout bounds this call.
        assert_eq!(ring.write(&[5, 6], SHORT), 0);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn partial_read_on_timeout_returns_buffered_bytes() {
        let ring = ByteRing::new(8);
        assert_eq!(ring.write(&[9, 9], SHORT), 2);

        // Ask for 4 — only 2 are buffered, so the call times out and hands
        // over the partial chunk.
        let mut buf = [0u8; 4];
        assert_eq!(ring.read(&mut buf, SHORT), 2);
        assert_eq!(&buf[..2], &[9, 9]);
    }

    // ---- Blocking hand-off -------------------------------------------------

    #[test]
    fn blocked_reader_is_woken_by_writer() {
        let ring = Arc::new(ByteRing::new(8));
        let writer = Arc::clone(&ring);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            writer.write(&[7, 7, 7, 7], None)
        });

        let mut buf = [0u8; 4];
        let n = ring.read(&mut buf, Some(Duration::from_secs(5)));
        assert_eq!(n, 4);
        assert_eq!(buf, [7, 7, 7, 7]);
        assert_eq!(handle.join().unwrap(), 4);
    }

    #[test]
    fn blocked_writer_is_woken_by_reader() {
        let ring = Arc::new(ByteRing::new(4));
        assert_eq!(ring.write(&[1, 2, 3, 4], None), 4);

        let reader = Arc::clone(&ring);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let mut buf = [0u8; 4];
            reader.read(&mut buf, None)
        });

        // Full ring: this blocks until the reader drains.
        let n = ring.write(&[5, 6], Some(Duration::from_secs(5)));
        assert_eq!(n, 2);
        assert_eq!(handle.join().unwrap(), 4);
    }

    // ---- Close semantics ---------------------------------------------------

    #[test]
    fn close_wakes_blocked_reader_with_zero() {
        let ring = Arc::new(ByteRing::new(8));
        let closer = Arc::clone(&ring);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            closer.close();
        });

        let mut buf = [0u8; 4];
        assert_eq!(ring.read(&mut buf, None), 0);
        handle.join().unwrap();
    }

    #[test]
    fn close_drains_remaining_bytes_first() {
        let ring = ByteRing::new(8);
        assert_eq!(ring.write(&[1, 2], None), 2);
        ring.close();

        let mut buf = [0u8; 4];
        // First read hands over the leftover bytes …
        assert_eq!(ring.read(&mut buf, None), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        // … then end-of-stream.
        assert_eq!(ring.read(&mut buf, None), 0);
    }

    #[test]
    fn write_after_close_returns_zero() {
        let ring = ByteRing::new(8);
        ring.close();
        assert_eq!(ring.write(&[1, 2, 3], None), 0);
    }

    // ---- Misc --------------------------------------------------------------

    #[test]
    fn clear_discards_unread_bytes() {
        let ring = ByteRing::new(8);
        ring.write(&[1, 2, 3], SHORT);
        ring.clear();
        assert!(ring.is_empty());

        ring.write(&[4], SHORT);
        let mut buf = [0u8; 1];
        assert_eq!(ring.read(&mut buf, SHORT), 1);
        assert_eq!(buf, [4]);
    }

    #[test]
    fn zero_length_read_returns_zero() {
        let ring = ByteRing::new(8);
        ring.write(&[1], SHORT);
        assert_eq!(ring.read(&mut [], SHORT), 0);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn capacity_reported_correctly() {
        let ring = ByteRing::new(4096);
        assert_eq!(ring.capacity(), 4096);
    }

    #[test]
    #[should_panic(expected = "ByteRing capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = ByteRing::new(0);
    }
}
