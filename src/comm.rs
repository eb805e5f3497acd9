/// Serial NDJSON transport helpers.
///
/// The sniffer streams captured frames and reports as newline-delimited JSON
/// on its console UART and accepts short JSON commands on the same port.

use crate::emitter::{FrameSink, SinkError};
use crate::engine::Sniffer;
use crate::frame::{write_hex, Frame};
use crate::protocol::{DeviceMessage, HexString, HostCommand, MsgBuffer, RawCommand, MAX_MSG_LEN};

/// Longest accepted command line
pub const MAX_CMD_LEN: usize = 64;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize a DeviceMessage into a fresh message buffer.
pub fn encode_message(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// Encode a captured frame as a `frame` message.
pub fn encode_frame(frame: &Frame) -> Option<MsgBuffer> {
    let mut data = HexString::new();
    write_hex(frame.bytes(), &mut data).ok()?;
    let msg = DeviceMessage::Frame {
        data: &data,
        len: frame.len() as u16,
        start: frame.start_us(),
        end: frame.end_us(),
        truncated: frame.truncated(),
        close: frame.cause().as_str(),
    };
    encode_message(&msg)
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "status" => Some(HostCommand::GetStatus),
        "stats" => Some(HostCommand::GetStats),
        "config" => Some(HostCommand::GetConfig),
        "flush" => Some(HostCommand::Flush),
        "reset_stats" => Some(HostCommand::ResetStats),
        other => {
            log::debug!("Unknown command '{}'", other);
            None
        }
    }
}

/// What the caller should send back after a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    None,
    /// Build a status message; uptime and queue depth live with the caller.
    Status,
    Stats(crate::engine::SnifferStats),
    Config(crate::config::SnifferConfig),
}

/// Apply a host command to the engine.
pub fn handle_command<S: FrameSink + ?Sized>(
    cmd: HostCommand,
    sniffer: &mut Sniffer,
    sink: &mut S,
) -> Reply {
    match cmd {
        HostCommand::GetStatus => Reply::Status,
        HostCommand::GetStats => Reply::Stats(sniffer.stats()),
        HostCommand::GetConfig => Reply::Config(*sniffer.config()),
        HostCommand::Flush => {
            sniffer.flush(sink);
            log::info!("Pending frame flushed by host command");
            Reply::None
        }
        HostCommand::ResetStats => {
            sniffer.reset_stats();
            log::info!("Counters reset by host command");
            Reply::None
        }
    }
}

/// Encode a command reply, if it has a self-contained message.
pub fn encode_reply(reply: &Reply) -> Option<MsgBuffer> {
    match reply {
        Reply::Stats(stats) => encode_message(&DeviceMessage::Stats(stats)),
        Reply::Config(config) => encode_message(&DeviceMessage::Config(config)),
        Reply::None | Reply::Status => None,
    }
}

// ── NDJSON frame sink ──────────────────────────────────────────────────

/// Sink that renders each frame as one NDJSON line and hands it to `send`,
/// typically a non-blocking channel `try_send`.
pub struct NdjsonSink<F> {
    send: F,
}

impl<F> NdjsonSink<F>
where
    F: FnMut(MsgBuffer) -> Result<(), SinkError>,
{
    pub fn new(send: F) -> Self {
        Self { send }
    }
}

impl<F> FrameSink for NdjsonSink<F>
where
    F: FnMut(MsgBuffer) -> Result<(), SinkError>,
{
    fn emit(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let buf = encode_frame(frame).ok_or(SinkError::Encode)?;
        (self.send)(buf)
    }
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_CMD_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_CMD_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: discard and reset
            self.pos = 0;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r' | b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnifferConfig;
    use crate::frame::{test_frame, CloseCause};

    fn as_str(buf: &MsgBuffer) -> &str {
        core::str::from_utf8(buf).unwrap()
    }

    // ── Command parsing ─────────────────────────────────────────────

    #[test]
    fn parse_known_commands() {
        assert_eq!(parse_command(br#"{"cmd":"status"}"#), Some(HostCommand::GetStatus));
        assert_eq!(parse_command(br#"{"cmd":"stats"}"#), Some(HostCommand::GetStats));
        assert_eq!(parse_command(br#"{"cmd":"config"}"#), Some(HostCommand::GetConfig));
        assert_eq!(parse_command(br#"{"cmd":"flush"}"#), Some(HostCommand::Flush));
        assert_eq!(
            parse_command(br#"{"cmd":"reset_stats"}"#),
            Some(HostCommand::ResetStats)
        );
    }

    #[test]
    fn parse_trims_trailing_whitespace() {
        assert_eq!(parse_command(b"{\"cmd\":\"stats\"}\r\n "), Some(HostCommand::GetStats));
    }

    #[test]
    fn parse_rejects_unknown_and_garbage() {
        assert_eq!(parse_command(br#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse_command(b"hello"), None);
        assert_eq!(parse_command(b"   \n"), None);
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_yields_line_on_newline() {
        let mut reader = LineReader::new();
        let mut got = None;
        for &b in b"{\"cmd\":\"flush\"}\n" {
            if let Some(line) = reader.feed(b) {
                got = Some(line.to_vec());
            }
        }
        assert_eq!(got.as_deref(), Some(&b"{\"cmd\":\"flush\"}"[..]));
    }

    #[test]
    fn line_reader_ignores_blank_lines() {
        let mut reader = LineReader::new();
        assert!(reader.feed(b'\r').is_none());
        assert!(reader.feed(b'\n').is_none());
    }

    #[test]
    fn line_reader_discards_overlong_line() {
        let mut reader = LineReader::new();
        for _ in 0..=MAX_CMD_LEN {
            assert!(reader.feed(b'x').is_none());
        }
        // Overflow reset the buffer; only the tail after it survives.
        assert!(reader.feed(b'y').is_none());
        assert_eq!(reader.feed(b'\n'), Some(&b"y"[..]));
    }

    // ── Encoding ────────────────────────────────────────────────────

    #[test]
    fn encode_frame_as_ndjson() {
        let frame = test_frame(&[0xAA, 0x04, 0x01], 1_000, 1_300);
        let buf = encode_frame(&frame).unwrap();
        let line = as_str(&buf);
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""type":"frame""#));
        assert!(line.contains(r#""data":"AA0401""#));
        assert!(line.contains(r#""len":3"#));
        assert!(line.contains(r#""end":1300"#));
        assert!(line.contains(r#""close":"gap""#));
    }

    #[test]
    fn encode_full_capacity_frame_fits() {
        let bytes = [0xFFu8; crate::defaults::MAX_FRAME_CAPACITY];
        let mut frame = test_frame(&bytes, u64::MAX - 1, u64::MAX);
        frame.cause = CloseCause::Capacity;
        let buf = encode_frame(&frame).unwrap();
        assert!(as_str(&buf).contains(r#""truncated":true"#));
    }

    #[test]
    fn ndjson_sink_forwards_and_reports_full() {
        let mut lines = std::vec::Vec::new();
        let mut sink = NdjsonSink::new(|buf: MsgBuffer| {
            if lines.len() == 1 {
                return Err(SinkError::Full);
            }
            lines.push(buf);
            Ok(())
        });
        assert_eq!(sink.emit(&test_frame(&[1], 0, 0)), Ok(()));
        assert_eq!(sink.emit(&test_frame(&[2], 0, 0)), Err(SinkError::Full));
        drop(sink);
        assert_eq!(lines.len(), 1);
    }

    // ── Command handling ────────────────────────────────────────────

    #[test]
    fn flush_command_emits_pending_frame() {
        let config = SnifferConfig {
            min_length: 0,
            ..SnifferConfig::new()
        };
        let mut sniffer = Sniffer::new(config);
        let mut lines = std::vec::Vec::new();
        let mut sink = NdjsonSink::new(|buf: MsgBuffer| {
            lines.push(buf);
            Ok(())
        });
        sniffer.push(0x01, 0, &mut sink);
        sniffer.push(0x02, 10, &mut sink);
        assert_eq!(handle_command(HostCommand::Flush, &mut sniffer, &mut sink), Reply::None);
        drop(sink);
        assert_eq!(lines.len(), 1);
        assert!(as_str(&lines[0]).contains(r#""close":"flush""#));
    }

    #[test]
    fn stats_and_config_replies_encode() {
        let mut sniffer = Sniffer::new(SnifferConfig::new());
        let mut sink = crate::emitter::LogSink;
        sniffer.push(0x01, 0, &mut sink);

        let reply = handle_command(HostCommand::GetStats, &mut sniffer, &mut sink);
        let buf = encode_reply(&reply).unwrap();
        assert!(as_str(&buf).contains(r#""bytes_in":1"#));

        let reply = handle_command(HostCommand::GetConfig, &mut sniffer, &mut sink);
        let buf = encode_reply(&reply).unwrap();
        assert!(as_str(&buf).contains(r#""min_gap_us":5000"#));

        let reply = handle_command(HostCommand::GetStatus, &mut sniffer, &mut sink);
        assert_eq!(reply, Reply::Status);
        assert!(encode_reply(&reply).is_none());
    }

    #[test]
    fn reset_stats_command() {
        let mut sniffer = Sniffer::new(SnifferConfig::new());
        let mut sink = crate::emitter::LogSink;
        sniffer.push(0x01, 0, &mut sink);
        handle_command(HostCommand::ResetStats, &mut sniffer, &mut sink);
        assert_eq!(sniffer.stats().bytes_in, 0);
    }
}
