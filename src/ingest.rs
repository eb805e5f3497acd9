//! Byte ingestion: the hand-off between the receive context (UART ISR or
//! poll task) and the engine task.
//!
//! [`ByteQueue::push`] is O(1), never blocks, never allocates. When the
//! engine falls behind the oldest queued byte is dropped: recent bytes are
//! the ones most likely to complete the frame currently on the wire.
//!
//! The queue is not internally synchronized. Firmware keeps it in a
//! `critical_section::Mutex<RefCell<_>>` and holds the lock only for a
//! push or a drain.

use heapless::Deque;

use crate::clock::Clock;

/// One received byte and its arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteEvent {
    pub value: u8,
    pub ts_us: u64,
}

/// Bounded drop-oldest queue of byte events.
pub struct ByteQueue<const N: usize> {
    events: Deque<ByteEvent, N>,
    dropped: u32,
}

impl<const N: usize> ByteQueue<N> {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            dropped: 0,
        }
    }

    /// Enqueue a byte stamped with `ts_us`.
    pub fn push(&mut self, value: u8, ts_us: u64) {
        let event = ByteEvent { value, ts_us };
        if self.events.is_full() {
            self.events.pop_front();
            self.dropped = self.dropped.wrapping_add(1);
        }
        let _ = self.events.push_back(event);
    }

    /// Enqueue a byte stamped with the current time of `clock`.
    pub fn push_now(&mut self, value: u8, clock: &impl Clock) {
        self.push(value, clock.now_us());
    }

    /// Enqueue a chunk read from a UART FIFO at `end_ts_us`.
    ///
    /// The driver only reports when the whole chunk is available, so bytes
    /// are back-dated one character time (`char_us`) apart, the last one at
    /// `end_ts_us`. Without this a continuous stream split across two reads
    /// would show a false gap the length of the second read.
    pub fn extend(&mut self, values: &[u8], end_ts_us: u64, char_us: u64) {
        let n = values.len() as u64;
        for (i, &v) in values.iter().enumerate() {
            let behind = (n - 1 - i as u64) * char_us;
            self.push(v, end_ts_us.saturating_sub(behind));
        }
    }

    pub fn pop(&mut self) -> Option<ByteEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total events discarded on overflow.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Return the overflow count and reset it.
    pub fn take_dropped(&mut self) -> u32 {
        core::mem::take(&mut self.dropped)
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
