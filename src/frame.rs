//! Closed frames: the unit every filter stage and the sink operate on.

use core::fmt::{self, Write};

use heapless::Vec;

use crate::defaults::MAX_FRAME_CAPACITY;

/// Byte storage for one frame.
pub type FrameBytes = Vec<u8, MAX_FRAME_CAPACITY>;

/// Why a frame was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The next byte arrived `min_gap_us` or more after the previous one.
    Gap,
    /// The frame reached `max_burst_len` bytes.
    Capacity,
    /// The engine was flushed on shutdown.
    Flush,
    /// The bus stayed silent for `min_gap_us` and the engine was polled.
    Idle,
}

impl CloseCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseCause::Gap => "gap",
            CloseCause::Capacity => "capacity",
            CloseCause::Flush => "flush",
            CloseCause::Idle => "idle",
        }
    }
}

/// An immutable run of bytes delimited by bus silence.
///
/// Always non-empty; `len() <= max_burst_len` of the engine that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub(crate) bytes: FrameBytes,
    pub(crate) start_us: u64,
    pub(crate) end_us: u64,
    pub(crate) cause: CloseCause,
}

impl Frame {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames are never empty; present for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Timestamp of the first byte.
    pub fn start_us(&self) -> u64 {
        self.start_us
    }

    /// Timestamp of the last byte.
    pub fn end_us(&self) -> u64 {
        self.end_us
    }

    pub fn cause(&self) -> CloseCause {
        self.cause
    }

    /// True if the frame was cut at the capacity cap rather than at a gap.
    pub fn truncated(&self) -> bool {
        self.cause == CloseCause::Capacity
    }

    /// Content fingerprint used for duplicate detection.
    pub fn fingerprint(&self) -> u64 {
        fingerprint(&self.bytes)
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the little-endian length followed by the bytes.
///
/// The length prefix keeps frames of different length in separate hash
/// domains.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    let len = (bytes.len() as u32).to_le_bytes();
    len.iter()
        .chain(bytes)
        .fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Write `bytes` as upper-case hex with no separators (`AABBCC`).
pub fn write_hex<W: Write>(bytes: &[u8], out: &mut W) -> fmt::Result {
    for b in bytes {
        write!(out, "{:02X}", b)?;
    }
    Ok(())
}

/// Write `bytes` as dotted hex followed by the length (`AA.BB.CC (3)`).
pub fn write_hex_pretty<W: Write>(bytes: &[u8], out: &mut W) -> fmt::Result {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.write_char('.')?;
        }
        write!(out, "{:02X}", b)?;
    }
    write!(out, " ({})", bytes.len())
}

/// Display adapter for [`write_hex_pretty`], handy in log macros.
pub struct HexPretty<'a>(pub &'a [u8]);

impl fmt::Display for HexPretty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex_pretty(self.0, f)
    }
}

#[cfg(test)]
pub(crate) fn test_frame(bytes: &[u8], start_us: u64, end_us: u64) -> Frame {
    Frame {
        bytes: FrameBytes::from_slice(bytes).unwrap(),
        start_us,
        end_us,
        cause: CloseCause::Gap,
    }
}
