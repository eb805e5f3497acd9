//! Sniffer configuration: value object, validation, and JSON overlay parsing.
//!
//! The engine assumes a validated [`SnifferConfig`]. Range checks happen here,
//! once, before [`Sniffer::new`](crate::engine::Sniffer::new) is called.

use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEDUPE_MS, IDLE_BYTES, IDLE_FILTER, MAX_BURST_LEN, MAX_BURST_LEN_MAX, MAX_BURST_LEN_MIN,
    MIN_GAP_US, MIN_LENGTH, MIN_LENGTH_MAX,
};

/// A 256-bit set of byte values.
///
/// Constant-time insert/lookup, 32 bytes on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSet {
    bits: [u64; 4],
}

impl ByteSet {
    /// Create an empty set.
    pub const fn new() -> Self {
        Self { bits: [0; 4] }
    }

    /// Build a set from a slice of byte values. Duplicates are harmless.
    pub const fn from_slice(values: &[u8]) -> Self {
        let mut set = Self::new();
        let mut i = 0;
        while i < values.len() {
            let b = values[i] as usize;
            set.bits[b / 64] |= 1u64 << (b % 64);
            i += 1;
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, value: u8) {
        let i = value as usize;
        self.bits[i / 64] |= 1u64 << (i % 64);
    }

    #[inline]
    pub fn contains(&self, value: u8) -> bool {
        let i = value as usize;
        (self.bits[i / 64] >> (i % 64)) & 1 == 1
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Number of values in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..256)
            .map(|v| v as u8)
            .filter(move |&v| self.contains(v))
    }
}

impl Default for ByteSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized as a JSON array of byte values, e.g. `[0,6,21]`.
impl Serialize for ByteSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for v in self.iter() {
            seq.serialize_element(&v)?;
        }
        seq.end()
    }
}

/// Engine configuration. Immutable once handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnifferConfig {
    /// Inter-byte silence (µs) that closes a frame. Must be > 0.
    pub min_gap_us: u32,
    /// Hard cap on frame length, 32..=4096.
    pub max_burst_len: u32,
    /// Frames shorter than this are dropped, 0..=512.
    pub min_length: u32,
    /// Duplicate suppression window (ms). Must be > 0.
    pub dedupe_ms: u32,
    /// Drop standalone single-byte frames whose byte is in `idle_bytes`.
    pub idle_filter: bool,
    pub idle_bytes: ByteSet,
}

impl SnifferConfig {
    pub const fn new() -> Self {
        Self {
            min_gap_us: MIN_GAP_US,
            max_burst_len: MAX_BURST_LEN,
            min_length: MIN_LENGTH,
            dedupe_ms: DEDUPE_MS,
            idle_filter: IDLE_FILTER,
            idle_bytes: ByteSet::from_slice(IDLE_BYTES),
        }
    }

    /// Check every option against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_gap_us == 0 {
            return Err(ConfigError::ZeroMinGap);
        }
        if !(MAX_BURST_LEN_MIN..=MAX_BURST_LEN_MAX).contains(&self.max_burst_len) {
            return Err(ConfigError::MaxBurstLenOutOfRange(self.max_burst_len));
        }
        if self.min_length > MIN_LENGTH_MAX {
            return Err(ConfigError::MinLengthOutOfRange(self.min_length));
        }
        if self.dedupe_ms == 0 {
            return Err(ConfigError::ZeroDedupeWindow);
        }
        Ok(())
    }

    /// Dedupe window in microseconds, the unit of byte timestamps.
    pub fn dedupe_window_us(&self) -> u64 {
        u64::from(self.dedupe_ms) * 1_000
    }
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("min_gap_us must be greater than zero")]
    ZeroMinGap,

    #[error("max_burst_len {0} outside 32..=4096")]
    MaxBurstLenOutOfRange(u32),

    #[error("min_length {0} outside 0..=512")]
    MinLengthOutOfRange(u32),

    #[error("dedupe_ms must be greater than zero")]
    ZeroDedupeWindow,

    #[error("malformed config JSON")]
    Malformed,
}

/// Wire format for a configuration overlay. Every field is optional; absent
/// fields keep their default.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    min_gap_us: Option<u32>,
    #[serde(default)]
    max_burst_len: Option<u32>,
    #[serde(default)]
    min_length: Option<u32>,
    #[serde(default)]
    dedupe_ms: Option<u32>,
    #[serde(default)]
    idle_filter: Option<bool>,
    #[serde(default)]
    idle_bytes: Option<heapless::Vec<u8, 256>>,
}

/// Parse a JSON object of option overrides on top of the defaults, then
/// validate the result.
///
/// `{"min_gap_us":3500,"idle_bytes":[6,21]}` replaces the gap and the whole
/// idle byte set; everything else stays at its default.
pub fn parse_config(data: &[u8]) -> Result<SnifferConfig, ConfigError> {
    let (raw, _) =
        serde_json_core::from_slice::<RawConfig>(data).map_err(|_| ConfigError::Malformed)?;

    let mut config = SnifferConfig::new();
    if let Some(v) = raw.min_gap_us {
        config.min_gap_us = v;
    }
    if let Some(v) = raw.max_burst_len {
        config.max_burst_len = v;
    }
    if let Some(v) = raw.min_length {
        config.min_length = v;
    }
    if let Some(v) = raw.dedupe_ms {
        config.dedupe_ms = v;
    }
    if let Some(v) = raw.idle_filter {
        config.idle_filter = v;
    }
    if let Some(bytes) = raw.idle_bytes {
        config.idle_bytes = ByteSet::from_slice(&bytes);
    }

    if let Err(e) = config.validate() {
        log::warn!("Rejected sniffer config: {}", e);
        return Err(e);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ByteSet ─────────────────────────────────────────────────────

    #[test]
    fn byteset_empty_on_creation() {
        let set = ByteSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        for v in 0..=255u8 {
            assert!(!set.contains(v), "byte {v} should be absent");
        }
    }

    #[test]
    fn byteset_word_boundaries() {
        let mut set = ByteSet::new();
        for &v in &[0u8, 63, 64, 127, 128, 191, 192, 255] {
            set.insert(v);
        }
        for &v in &[0u8, 63, 64, 127, 128, 191, 192, 255] {
            assert!(set.contains(v), "byte {v} should be set");
        }
        for &v in &[1u8, 62, 65, 126, 129, 190, 193, 254] {
            assert!(!set.contains(v), "byte {v} should NOT be set");
        }
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn byteset_from_slice_ignores_duplicates() {
        let set = ByteSet::from_slice(&[6, 6, 21, 6]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(6));
        assert!(set.contains(21));
    }

    #[test]
    fn byteset_iter_ascending() {
        let set = ByteSet::from_slice(&[0xFF, 0x06, 0x00]);
        let members: heapless::Vec<u8, 8> = set.iter().collect();
        assert_eq!(&members[..], &[0x00, 0x06, 0xFF]);
    }

    #[test]
    fn byteset_serializes_as_array() {
        let set = ByteSet::from_slice(&[21, 6]);
        let mut buf = [0u8; 32];
        let len = serde_json_core::to_slice(&set, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"[6,21]");
    }

    // ── Validation ──────────────────────────────────────────────────

    #[test]
    fn default_config_is_valid() {
        let config = SnifferConfig::new();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.min_gap_us, 5000);
        assert_eq!(config.min_length, 8);
        assert_eq!(config.dedupe_ms, 200);
        assert!(config.idle_filter);
        assert_eq!(config.idle_bytes.len(), 16);
    }

    #[test]
    fn zero_gap_rejected() {
        let config = SnifferConfig {
            min_gap_us: 0,
            ..SnifferConfig::new()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMinGap));
    }

    #[test]
    fn burst_len_bounds() {
        for (len, ok) in [(31, false), (32, true), (4096, true), (4097, false)] {
            let config = SnifferConfig {
                max_burst_len: len,
                ..SnifferConfig::new()
            };
            assert_eq!(config.validate().is_ok(), ok, "max_burst_len {len}");
        }
    }

    #[test]
    fn min_length_bounds() {
        let mut config = SnifferConfig::new();
        config.min_length = 512;
        assert!(config.validate().is_ok());
        config.min_length = 513;
        assert_eq!(config.validate(), Err(ConfigError::MinLengthOutOfRange(513)));
    }

    #[test]
    fn zero_dedupe_rejected() {
        let config = SnifferConfig {
            dedupe_ms: 0,
            ..SnifferConfig::new()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDedupeWindow));
    }

    #[test]
    fn dedupe_window_in_micros() {
        assert_eq!(SnifferConfig::new().dedupe_window_us(), 200_000);
    }

    // ── JSON overlay ────────────────────────────────────────────────

    #[test]
    fn parse_empty_object_gives_defaults() {
        assert_eq!(parse_config(b"{}"), Ok(SnifferConfig::new()));
    }

    #[test]
    fn parse_overrides_selected_fields() {
        let config =
            parse_config(br#"{"min_gap_us":3500,"idle_filter":false,"idle_bytes":[6,21]}"#)
                .unwrap();
        assert_eq!(config.min_gap_us, 3500);
        assert!(!config.idle_filter);
        assert_eq!(config.idle_bytes, ByteSet::from_slice(&[6, 21]));
        assert_eq!(config.max_burst_len, MAX_BURST_LEN);
    }

    #[test]
    fn parse_rejects_out_of_range() {
        assert_eq!(
            parse_config(br#"{"max_burst_len":8}"#),
            Err(ConfigError::MaxBurstLenOutOfRange(8))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_config(b"not json"), Err(ConfigError::Malformed));
    }

    #[test]
    fn serialize_config() {
        let config = SnifferConfig {
            idle_bytes: ByteSet::from_slice(&[6]),
            ..SnifferConfig::new()
        };
        let mut buf = [0u8; 256];
        let len = serde_json_core::to_slice(&config, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains(r#""min_gap_us":5000"#));
        assert!(json.contains(r#""idle_bytes":[6]"#));
    }
}
