/// NDJSON message protocol between the sniffer and whatever reads its
/// serial output.
///
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::config::SnifferConfig;
use crate::defaults::MAX_FRAME_CAPACITY;
use crate::engine::SnifferStats;

/// Hex rendering of a full frame (two characters per byte).
pub type HexString = String<{ 2 * MAX_FRAME_CAPACITY }>;

/// Messages sent from the sniffer to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// One captured frame
    #[serde(rename = "frame")]
    Frame {
        /// Upper-case hex, no separators
        data: &'a HexString,
        len: u16,
        /// Timestamp of first byte (µs since boot)
        start: u64,
        /// Timestamp of last byte (µs since boot)
        end: u64,
        truncated: bool,
        /// Close cause: "gap", "capacity", "flush", "idle"
        close: &'static str,
    },
    /// Diagnostic counters
    #[serde(rename = "stats")]
    Stats(&'a SnifferStats),
    /// Active engine configuration
    #[serde(rename = "config")]
    Config(&'a SnifferConfig),
    /// Device status report
    #[serde(rename = "status")]
    Status {
        /// Uptime in seconds
        uptime: u32,
        /// Bytes waiting in the receive queue
        queued: u16,
        /// Whether a frame is currently being accumulated
        frame_open: bool,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from the host to the sniffer.
///
/// Deserialized via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    /// Request a status report
    GetStatus,
    /// Request the diagnostic counters
    GetStats,
    /// Request the active configuration
    GetConfig,
    /// Close and emit any pending frame now
    Flush,
    /// Zero the diagnostic counters
    ResetStats,
}

/// Wire format for host commands, e.g. `{"cmd":"stats"}`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message: a full frame in hex plus
/// the surrounding fields.
pub const MAX_MSG_LEN: usize = 2 * MAX_FRAME_CAPACITY + 192;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
