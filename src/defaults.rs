//! Compiled-in defaults and limits for the sniffer engine.
//!
//! The idle byte table lists single-byte codes that RS-485 masters and
//! line drivers commonly put on the wire between messages.

/// Inter-byte silence (µs) that closes a frame.
pub const MIN_GAP_US: u32 = 5_000;

/// Default hard cap on frame length.
pub const MAX_BURST_LEN: u32 = 256;

/// Smallest accepted `max_burst_len`.
pub const MAX_BURST_LEN_MIN: u32 = 32;

/// Largest accepted `max_burst_len`. Also the frame buffer capacity.
pub const MAX_BURST_LEN_MAX: u32 = 4096;

/// Default minimum surviving frame length.
pub const MIN_LENGTH: u32 = 8;

/// Largest accepted `min_length`.
pub const MIN_LENGTH_MAX: u32 = 512;

/// Default duplicate suppression window (ms).
pub const DEDUPE_MS: u32 = 200;

/// Single-byte noise suppression is on unless configured otherwise.
pub const IDLE_FILTER: bool = true;

/// Byte capacity of every [`Frame`](crate::frame::Frame) buffer.
pub const MAX_FRAME_CAPACITY: usize = MAX_BURST_LEN_MAX as usize;

/// Number of fingerprints the deduplicator remembers.
pub const DEDUPE_CACHE_SIZE: usize = 32;

/// Depth of the byte event queue between the receive context and the engine.
///
/// At 115200 baud (~11.5 kB/s) this holds ~90 ms of traffic.
pub const BYTE_QUEUE_LEN: usize = 1024;

/// Default idle byte codes (16 entries).
pub const IDLE_BYTES: &[u8] = &[
    0x00, // NUL / line break condition
    0x02, // STX
    0x03, // ETX
    0x04, // EOT
    0x05, // ENQ (poll)
    0x06, // ACK
    0x10, // DLE
    0x11, // XON
    0x13, // XOFF
    0x15, // NAK
    0x16, // SYN
    0x18, // CAN
    0x1B, // ESC
    0x55, // sync preamble (0b01010101)
    0x7E, // HDLC flag
    0xFF, // idle line read as a byte
];
