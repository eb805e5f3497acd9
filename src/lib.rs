//! rs485-sniffer library: portable RS-485 bus capture engine.
//!
//! Watches raw serial traffic, groups bytes into frames by inter-byte
//! silence, drops single-byte idle noise and runt frames, and rate-limits
//! repeated frames before they reach a log sink. The engine has no platform
//! dependencies and is testable on any host with `cargo test`. Platform
//! binaries (Embassy firmware in `firmware/`, ESP-IDF firmware in
//! `firmware-std/`) are thin consumers that supply bytes, a clock, and an
//! output sink.
//!
//! Pipeline, in order:
//! [`ingest`] → [`assembler`] → [`filter`] (idle, then length) →
//! [`dedupe`] → [`emitter`], wired together by [`engine::Sniffer`].
//!
//! `no_std`, no allocator: every buffer is a fixed-capacity `heapless` type.

#![cfg_attr(not(test), no_std)]

pub mod assembler;
pub mod board;
pub mod clock;
pub mod comm;
pub mod config;
pub mod dedupe;
pub mod defaults;
pub mod emitter;
pub mod engine;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod protocol;

pub use config::{parse_config, ByteSet, ConfigError, SnifferConfig};
pub use engine::{Disposition, Sniffer, SnifferStats};
pub use frame::{CloseCause, Frame};
