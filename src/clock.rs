//! Monotonic microsecond time source.
//!
//! The engine never reads a clock itself. Firmware wraps its platform timer
//! (`embassy_time::Instant`, `std::time::Instant`) in a [`Clock`] and passes it
//! in when draining the byte queue or polling for idle frames.

use core::cell::Cell;

pub trait Clock {
    /// Microseconds since an arbitrary fixed epoch (usually boot).
    fn now_us(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// A clock that only moves when told to. Used by tests and host-side replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub const fn new(start_us: u64) -> Self {
        Self {
            now: Cell::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now.set(now_us);
    }

    pub fn advance(&self, delta_us: u64) {
        self.now.set(self.now.get().saturating_add(delta_us));
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }
}

/// Reads `inner` minus a fixed lag, never going below zero.
///
/// Bytes reach the engine some time after they finish on the wire (UART RX
/// timeout, task scheduling). Polling for idle frames against the lagged
/// clock keeps a frame whose tail is still in flight from closing early.
#[derive(Debug, Clone, Copy)]
pub struct Lagged<C> {
    inner: C,
    lag_us: u64,
}

impl<C: Clock> Lagged<C> {
    pub const fn new(inner: C, lag_us: u64) -> Self {
        Self { inner, lag_us }
    }

    pub fn lag_us(&self) -> u64 {
        self.lag_us
    }
}

impl<C: Clock> Clock for Lagged<C> {
    fn now_us(&self) -> u64 {
        self.inner.now_us().saturating_sub(self.lag_us)
    }
}
