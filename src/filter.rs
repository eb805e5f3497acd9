//! Stateless frame filters, applied in fixed order after assembly.
//!
//! The idle check runs before the length check so that a lone idle byte is
//! attributed to the idle filter even when `min_length` is 0 or 1.

use crate::config::SnifferConfig;
use crate::frame::Frame;

/// Outcome of running a frame through the filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Standalone idle byte.
    Idle,
    /// Shorter than `min_length`.
    Short,
}

/// Reject a frame iff idle filtering is on, the frame is a single byte,
/// and that byte is a configured idle code. Longer frames that merely
/// contain an idle byte always pass.
pub fn idle_accept(frame: &Frame, config: &SnifferConfig) -> bool {
    if !config.idle_filter {
        return true;
    }
    !matches!(frame.bytes(), [b] if config.idle_bytes.contains(*b))
}

pub fn length_accept(frame: &Frame, config: &SnifferConfig) -> bool {
    frame.len() as u64 >= u64::from(config.min_length)
}

/// Run the idle and length filters, short-circuiting on the first rejection.
pub fn evaluate(frame: &Frame, config: &SnifferConfig) -> Verdict {
    if !idle_accept(frame, config) {
        Verdict::Idle
    } else if !length_accept(frame, config) {
        Verdict::Short
    } else {
        Verdict::Pass
    }
}
