//! Hand-off of surviving frames to an external sink.
//!
//! The emitter never blocks and never retries: a sink that cannot take a
//! frame right now reports [`SinkError::Full`] and the frame is counted as
//! dropped.

use crate::frame::{Frame, HexPretty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("sink full")]
    Full,
    #[error("frame could not be encoded")]
    Encode,
}

/// Consumer of closed, filtered, deduplicated frames.
pub trait FrameSink {
    fn emit(&mut self, frame: &Frame) -> Result<(), SinkError>;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn emit(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (**self).emit(frame)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Emitter {
    emitted: u32,
    dropped: u32,
}

impl Emitter {
    pub const fn new() -> Self {
        Self {
            emitted: 0,
            dropped: 0,
        }
    }

    /// Returns true if the sink accepted the frame.
    pub fn emit<S: FrameSink + ?Sized>(&mut self, frame: &Frame, sink: &mut S) -> bool {
        match sink.emit(frame) {
            Ok(()) => {
                self.emitted = self.emitted.wrapping_add(1);
                true
            }
            Err(e) => {
                if self.dropped == 0 {
                    log::warn!("Frame sink not keeping up: {}", e);
                }
                self.dropped = self.dropped.wrapping_add(1);
                false
            }
        }
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Writes each frame as a `log::info!` line: `t=<start>us AA.BB.CC (3)`.
/// Truncated frames are tagged with `[truncated]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn emit(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if frame.truncated() {
            log::info!(
                "t={}us {} [truncated]",
                frame.start_us(),
                HexPretty(frame.bytes())
            );
        } else {
            log::info!("t={}us {}", frame.start_us(), HexPretty(frame.bytes()));
        }
        Ok(())
    }
}
