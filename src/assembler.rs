//! Gap-based frame segmentation.
//!
//! Two states: `Idle` (no frame open) and `Accumulating`. Each pushed byte
//! either extends the open frame or closes it and opens a new one with that
//! byte. A frame closes when:
//! - the next byte arrives `min_gap_us` or more after the previous one (gap),
//! - the byte just appended brings it to `max_burst_len` (capacity, the
//!   frame is marked truncated),
//! - the engine is flushed, or polled after `min_gap_us` of silence.
//!
//! No byte is ever dropped: a byte that arrives after a gap starts the next
//! frame, and after a capacity close the next byte opens a fresh one.

use crate::config::SnifferConfig;
use crate::defaults::MAX_FRAME_CAPACITY;
use crate::frame::{CloseCause, Frame, FrameBytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Accumulating { start_us: u64, last_us: u64 },
}

pub struct FrameAssembler {
    min_gap_us: u64,
    max_burst_len: usize,
    bytes: FrameBytes,
    state: State,
    clock_anomalies: u32,
}

impl FrameAssembler {
    pub fn new(config: &SnifferConfig) -> Self {
        Self {
            min_gap_us: u64::from(config.min_gap_us),
            // Unvalidated configs must still fit the fixed buffer, and a
            // lone opening byte must never fill a frame.
            max_burst_len: (config.max_burst_len as usize).clamp(2, MAX_FRAME_CAPACITY),
            bytes: FrameBytes::new(),
            state: State::Idle,
            clock_anomalies: 0,
        }
    }

    /// Feed one byte. Returns the frame this byte closed, if any.
    pub fn push(&mut self, byte: u8, ts_us: u64) -> Option<Frame> {
        match self.state {
            State::Idle => {
                self.open(byte, ts_us);
                None
            }
            State::Accumulating { start_us, last_us } => {
                if ts_us < last_us {
                    self.note_clock_anomaly(last_us, ts_us);
                }
                // Non-monotonic timestamps count as zero gap.
                let gap = ts_us.saturating_sub(last_us);

                if gap >= self.min_gap_us {
                    let closed = self.close(CloseCause::Gap);
                    self.open(byte, ts_us);
                    return closed;
                }

                // len < max_burst_len <= capacity, cannot fail
                let _ = self.bytes.push(byte);
                self.state = State::Accumulating {
                    start_us,
                    last_us: ts_us.max(last_us),
                };

                if self.bytes.len() >= self.max_burst_len {
                    log::debug!(
                        "Frame hit max_burst_len {} at {} us, closing",
                        self.max_burst_len,
                        ts_us
                    );
                    self.close(CloseCause::Capacity)
                } else {
                    None
                }
            }
        }
    }

    /// Close the open frame if the bus has been silent for `min_gap_us`.
    pub fn poll(&mut self, now_us: u64) -> Option<Frame> {
        match self.state {
            State::Accumulating { last_us, .. }
                if now_us.saturating_sub(last_us) >= self.min_gap_us =>
            {
                self.close(CloseCause::Idle)
            }
            _ => None,
        }
    }

    /// Close the open frame unconditionally.
    pub fn flush(&mut self) -> Option<Frame> {
        self.close(CloseCause::Flush)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    /// Bytes held by the open frame.
    pub fn pending_len(&self) -> usize {
        self.bytes.len()
    }

    /// Pushes whose timestamp went backwards.
    pub fn clock_anomalies(&self) -> u32 {
        self.clock_anomalies
    }

    pub fn reset_counters(&mut self) {
        self.clock_anomalies = 0;
    }

    fn open(&mut self, byte: u8, ts_us: u64) {
        self.bytes.clear();
        let _ = self.bytes.push(byte);
        self.state = State::Accumulating {
            start_us: ts_us,
            last_us: ts_us,
        };
    }

    fn close(&mut self, cause: CloseCause) -> Option<Frame> {
        let State::Accumulating { start_us, last_us } = self.state else {
            return None;
        };
        self.state = State::Idle;
        Some(Frame {
            bytes: core::mem::take(&mut self.bytes),
            start_us,
            end_us: last_us,
            cause,
        })
    }

    fn note_clock_anomaly(&mut self, last_us: u64, ts_us: u64) {
        if self.clock_anomalies % 256 == 0 {
            log::warn!(
                "Byte timestamp went backwards ({} -> {} us), treating as zero gap",
                last_us,
                ts_us
            );
        }
        self.clock_anomalies = self.clock_anomalies.wrapping_add(1);
    }
}
