//! rs485-sniffer ESP-IDF std firmware
//!
//! Thread-based implementation using FreeRTOS threads and std::sync::mpsc
//! channels. Same pipeline as the no_std Embassy firmware, plus host
//! commands read from the console (stdin).

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use esp_idf_svc::hal::delay::{BLOCK, NON_BLOCK};
use esp_idf_svc::hal::gpio::{AnyIOPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::{esp, uart_set_rx_timeout};

use rs485_sniffer::clock::{Clock, Lagged};
use rs485_sniffer::comm::{self, LineReader, NdjsonSink, Reply};
use rs485_sniffer::defaults::BYTE_QUEUE_LEN;
use rs485_sniffer::emitter::SinkError;
use rs485_sniffer::ingest::ByteQueue;
use rs485_sniffer::protocol::{DeviceMessage, HostCommand, MsgBuffer, VERSION};
use rs485_sniffer::{board, parse_config, Sniffer, SnifferConfig};

// ── Shared state ─────────────────────────────────────────────────────

static BYTE_QUEUE: Mutex<ByteQueue<BYTE_QUEUE_LEN>> = Mutex::new(ByteQueue::new());
static FRAME_OPEN: AtomicBool = AtomicBool::new(false);

const STATS_INTERVAL: Duration = Duration::from_secs(30);
const RX_CHUNK: usize = 128;

/// Microseconds since boot.
#[derive(Clone, Copy)]
struct BootClock {
    boot: Instant,
}

impl BootClock {
    fn uptime_secs(&self) -> u32 {
        self.boot.elapsed().as_secs() as u32
    }
}

impl Clock for BootClock {
    fn now_us(&self) -> u64 {
        self.boot.elapsed().as_micros() as u64
    }
}

/// A panic elsewhere must not stop capture; the queue stays usable.
fn lock_queue() -> MutexGuard<'static, ByteQueue<BYTE_QUEUE_LEN>> {
    BYTE_QUEUE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn load_config() -> SnifferConfig {
    let Some(json) = option_env!("RS485_SNIFFER_CONFIG") else {
        return SnifferConfig::new();
    };
    match parse_config(json.as_bytes()) {
        Ok(config) => {
            log::info!("Using build-time sniffer config");
            config
        }
        Err(e) => {
            log::warn!("RS485_SNIFFER_CONFIG ignored ({}), using defaults", e);
            SnifferConfig::new()
        }
    }
}

fn status_message(clock: &BootClock) -> DeviceMessage<'static> {
    let queued = lock_queue().len();
    DeviceMessage::Status {
        uptime: clock.uptime_secs(),
        queued: queued as u16,
        frame_open: FRAME_OPEN.load(Ordering::Relaxed),
        board: board::BOARD_NAME,
        version: VERSION,
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let clock = BootClock {
        boot: Instant::now(),
    };

    log::info!("rs485-sniffer v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    let config = load_config();
    log::info!(
        "Bus {} baud: 3.5 char times = {} us, min_gap_us = {}",
        board::RS485_BAUD,
        board::char_times_us(board::RS485_BAUD, 35),
        config.min_gap_us,
    );

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let uart_config = UartConfig::default().baudrate(Hertz(board::RS485_BAUD));

    #[cfg(feature = "xiao")]
    let (mut de, uart) = (
        PinDriver::output(peripherals.pins.gpio4)?,
        UartDriver::new(
            peripherals.uart1,
            peripherals.pins.gpio43,
            peripherals.pins.gpio44,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &uart_config,
        )?,
    );
    #[cfg(feature = "m5stickc")]
    let (mut de, uart) = (
        PinDriver::output(peripherals.pins.gpio26)?,
        UartDriver::new(
            peripherals.uart1,
            peripherals.pins.gpio32,
            peripherals.pins.gpio33,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &uart_config,
        )?,
    );

    // DE and /RE low: receiver enabled, driver off
    de.set_low()?;

    // Short RX timeout so a partial FIFO is handed over well inside a gap
    esp!(unsafe { uart_set_rx_timeout(uart.port(), board::RX_TIMEOUT_CHARS) })?;

    log::info!(
        "RS-485 on UART1: RX GPIO{}, TX GPIO{} (unused), DE GPIO{}",
        board::RS485_RX_PIN,
        board::RS485_TX_PIN,
        board::RS485_DE_PIN,
    );

    // ── Channels ─────────────────────────────────────────────────────

    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);
    let (cmd_tx, cmd_rx) = mpsc::sync_channel::<HostCommand>(4);

    // ── UART reader thread ───────────────────────────────────────────

    thread::Builder::new()
        .name("uartrx".into())
        .stack_size(4096)
        .spawn(move || {
            uart_rx_thread(uart, clock);
        })?;
    log::info!("UART reader thread spawned");

    // ── Sniffer thread ───────────────────────────────────────────────

    let sniffer_output_tx = output_tx.clone();
    thread::Builder::new()
        .name("sniffer".into())
        .stack_size(32 * 1024)
        .spawn(move || {
            sniffer_thread(config, clock, cmd_rx, sniffer_output_tx);
        })?;
    log::info!("Sniffer thread spawned");

    // ── Output thread ────────────────────────────────────────────────

    thread::Builder::new()
        .name("output".into())
        .stack_size(16 * 1024)
        .spawn(move || {
            output_thread(output_rx);
        })?;
    log::info!("Output thread spawned");

    // ── Status thread ────────────────────────────────────────────────

    let status_output_tx = output_tx.clone();
    thread::Builder::new()
        .name("status".into())
        .stack_size(16 * 1024)
        .spawn(move || {
            status_thread(clock, status_output_tx);
        })?;
    log::info!("Status thread spawned");

    log::info!(
        "Build target: {}",
        if cfg!(feature = "xiao") {
            "xiao (ESP32-S3)"
        } else if cfg!(feature = "m5stickc") {
            "m5stickc (ESP32)"
        } else {
            "unknown"
        }
    );

    // Console commands run on the main thread; `de` stays alive with it.
    command_loop(cmd_tx);
}

// ── UART reader thread ───────────────────────────────────────────────

fn uart_rx_thread(uart: UartDriver<'static>, clock: BootClock) {
    log::info!("UART reader thread started");

    let char_us = u64::from(board::char_times_us(board::RS485_BAUD, 10));
    let mut buf = [0u8; RX_CHUNK];

    loop {
        // Block for one byte, then take whatever else the driver already holds
        match uart.read(&mut buf[..1], BLOCK) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(e) => {
                log::warn!("UART RX error: {}", e);
                continue;
            }
        }
        let rest = uart.read(&mut buf[1..], NON_BLOCK).unwrap_or(0);
        let ts = clock.now_us();
        lock_queue().extend(&buf[..1 + rest], ts, char_us);
    }
}

// ── Sniffer thread ───────────────────────────────────────────────────

fn sniffer_thread(
    config: SnifferConfig,
    clock: BootClock,
    cmd_rx: mpsc::Receiver<HostCommand>,
    output_tx: SyncSender<MsgBuffer>,
) {
    log::info!("Sniffer thread started");

    let poll_every = Duration::from_micros(u64::from(config.min_gap_us / 2)).max(Duration::from_millis(1));
    let rx_latency_us = board::rx_latency_us(board::RS485_BAUD);
    if rx_latency_us >= config.min_gap_us {
        log::warn!(
            "RX latency {} us >= min_gap_us {}, frame boundaries may drift",
            rx_latency_us,
            config.min_gap_us
        );
    }
    // Idle closes trail wall time by the delivery latency
    let idle_clock = Lagged::new(clock, u64::from(rx_latency_us));
    let frame_tx = output_tx.clone();
    let mut sink = NdjsonSink::new(move |buf: MsgBuffer| {
        frame_tx.try_send(buf).map_err(|_| SinkError::Full)
    });
    let mut sniffer = Sniffer::new(config);
    let mut next_stats = Instant::now() + STATS_INTERVAL;

    loop {
        let cmd = match cmd_rx.recv_timeout(poll_every) {
            Ok(cmd) => Some(cmd),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        sniffer.record_queue_drops(lock_queue().take_dropped());
        // One event per lock so the RX thread is never held off for a whole burst
        loop {
            let next = lock_queue().pop();
            let Some(event) = next else { break };
            sniffer.push(event.value, event.ts_us, &mut sink);
        }
        sniffer.poll(idle_clock.now_us(), &mut sink);
        FRAME_OPEN.store(sniffer.frame_open(), Ordering::Relaxed);

        if let Some(cmd) = cmd {
            let reply = comm::handle_command(cmd, &mut sniffer, &mut sink);
            FRAME_OPEN.store(sniffer.frame_open(), Ordering::Relaxed);
            let buf = match reply {
                Reply::Status => comm::encode_message(&status_message(&clock)),
                other => comm::encode_reply(&other),
            };
            if let Some(buf) = buf {
                let _ = output_tx.try_send(buf);
            }
        }

        if Instant::now() >= next_stats {
            next_stats += STATS_INTERVAL;
            if let Some(buf) = comm::encode_message(&DeviceMessage::Stats(&sniffer.stats())) {
                let _ = output_tx.try_send(buf);
            }
        }
    }

    log::warn!("Command channel closed, flushing");
    sniffer.flush(&mut sink);
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: mpsc::Receiver<MsgBuffer>) {
    log::info!("Output thread started");

    while let Ok(msg) = output_rx.recv() {
        if let Ok(s) = std::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(clock: BootClock, output_tx: SyncSender<MsgBuffer>) {
    loop {
        thread::sleep(Duration::from_secs(30));

        if let Some(buf) = comm::encode_message(&status_message(&clock)) {
            let _ = output_tx.try_send(buf);
        }
    }
}

// ── Console commands ─────────────────────────────────────────────────

fn command_loop(cmd_tx: SyncSender<HostCommand>) -> ! {
    let mut stdin = std::io::stdin();
    let mut reader = LineReader::new();
    let mut byte = [0u8; 1];

    loop {
        match stdin.read(&mut byte) {
            Ok(1) => {
                if let Some(line) = reader.feed(byte[0]) {
                    match comm::parse_command(line) {
                        Some(cmd) => {
                            let _ = cmd_tx.try_send(cmd);
                        }
                        None => log::warn!("Ignoring unrecognized command"),
                    }
                }
            }
            // The ESP-IDF console returns immediately when no input is pending
            _ => thread::sleep(Duration::from_millis(20)),
        }
    }
}
