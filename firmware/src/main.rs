//! rs485-sniffer Embassy firmware
//!
//! Listens on an RS-485 transceiver wired to UART1, runs every received
//! byte through the sniffer engine, and prints surviving frames as NDJSON
//! on the console. The transceiver is held in receive mode; nothing is ever
//! driven onto the bus.

#![no_std]
#![no_main]

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, RxConfig, Uart, UartRx};
use esp_hal::Async;

use rs485_sniffer::clock::{Clock, Lagged};
use rs485_sniffer::comm::{self, NdjsonSink};
use rs485_sniffer::defaults::BYTE_QUEUE_LEN;
use rs485_sniffer::emitter::SinkError;
use rs485_sniffer::ingest::ByteQueue;
use rs485_sniffer::protocol::{DeviceMessage, MsgBuffer, VERSION};
use rs485_sniffer::{board, parse_config, Sniffer, SnifferConfig};

// ── Channel type aliases ──────────────────────────────────────────────

type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 4>;

// ── Static channels and shared state ─────────────────────────────────

/// Received bytes waiting for the sniffer task. Filled by the UART task,
/// drained one event per lock by the sniffer task.
static BYTE_QUEUE: Mutex<RefCell<ByteQueue<BYTE_QUEUE_LEN>>> =
    Mutex::new(RefCell::new(ByteQueue::new()));

/// Raised by the UART task after each chunk is queued
static RX_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Serialized NDJSON lines on their way to the console
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Mirror of `Sniffer::frame_open` for status reports
static FRAME_OPEN: AtomicBool = AtomicBool::new(false);

const STATS_INTERVAL: Duration = Duration::from_secs(30);
const RX_CHUNK: usize = 64;

/// Monotonic microseconds since boot from the Embassy time driver.
struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
}

/// Build-time override: `RS485_SNIFFER_CONFIG='{"min_gap_us":3645}' cargo build`.
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

fn queued_bytes() -> u16 {
    critical_section::with(|cs| BYTE_QUEUE.borrow_ref(cs).len()) as u16
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Start the RTOS: requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("rs485-sniffer v{} starting on {}", VERSION, board::BOARD_NAME);

    let config = load_config();
    log::info!(
        "Bus {} baud: 3.5 char times = {} us, min_gap_us = {}",
        board::RS485_BAUD,
        board::char_times_us(board::RS485_BAUD, 35),
        config.min_gap_us,
    );

    // DE and /RE low: receiver enabled, driver off
    #[cfg(feature = "xiao")]
    let _de = Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default());
    #[cfg(feature = "m5stickc")]
    let _de = Output::new(peripherals.GPIO26, Level::Low, OutputConfig::default());

    // Short RX timeout so a partial FIFO is handed over well inside a gap
    let uart_config = UartConfig::default()
        .with_baudrate(board::RS485_BAUD)
        .with_rx(RxConfig::default().with_timeout(board::RX_TIMEOUT_CHARS));

    #[cfg(feature = "xiao")]
    let uart = Uart::new(peripherals.UART1, uart_config)
        .expect("UART1 init failed")
        .with_rx(peripherals.GPIO44)
        .with_tx(peripherals.GPIO43);
    #[cfg(feature = "m5stickc")]
    let uart = Uart::new(peripherals.UART1, uart_config)
        .expect("UART1 init failed")
        .with_rx(peripherals.GPIO33)
        .with_tx(peripherals.GPIO32);

    let (rx, _tx) = uart.into_async().split();

    log::info!(
        "RS-485 on UART1: RX GPIO{}, TX GPIO{} (unused), DE GPIO{}",
        board::RS485_RX_PIN,
        board::RS485_TX_PIN,
        board::RS485_DE_PIN,
    );

    spawner.spawn(uart_rx_task(rx)).unwrap();
    spawner.spawn(sniffer_task(config)).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();

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
}

/// UART receive task: timestamps each FIFO chunk and queues its bytes.
#[embassy_executor::task]
async fn uart_rx_task(mut rx: UartRx<'static, Async>) {
    log::info!("UART RX task started");

    let clock = EmbassyClock;
    let char_us = u64::from(board::char_times_us(board::RS485_BAUD, 10));
    let mut buf = [0u8; RX_CHUNK];

    loop {
        match rx.read_async(&mut buf).await {
            Ok(0) => {}
            Ok(n) => {
                let ts = clock.now_us();
                critical_section::with(|cs| {
                    BYTE_QUEUE.borrow_ref_mut(cs).extend(&buf[..n], ts, char_us)
                });
                RX_SIGNAL.signal(());
            }
            Err(e) => log::warn!("UART RX error: {:?}", e),
        }
    }
}

/// Sniffer task: owns the engine. Wakes on new bytes or every half gap to
/// close frames the bus has gone quiet on.
#[embassy_executor::task]
async fn sniffer_task(config: SnifferConfig) {
    log::info!("Sniffer task started");

    // Idle closes trail wall time by the delivery latency, so bytes still
    // waiting in the UART cannot be mistaken for silence.
    let rx_latency_us = board::rx_latency_us(board::RS485_BAUD);
    if rx_latency_us >= config.min_gap_us {
        log::warn!(
            "RX latency {} us >= min_gap_us {}, frame boundaries may drift",
            rx_latency_us,
            config.min_gap_us
        );
    }
    let clock = Lagged::new(EmbassyClock, u64::from(rx_latency_us));
    let poll_every = Duration::from_micros(u64::from(config.min_gap_us / 2).max(500));
    let output_tx = OUTPUT_CHANNEL.sender();
    let mut sink = NdjsonSink::new(|buf: MsgBuffer| {
        output_tx.try_send(buf).map_err(|_| SinkError::Full)
    });
    let mut sniffer = Sniffer::new(config);
    let mut next_stats = Instant::now() + STATS_INTERVAL;

    loop {
        select(RX_SIGNAL.wait(), Timer::after(poll_every)).await;

        let dropped = critical_section::with(|cs| BYTE_QUEUE.borrow_ref_mut(cs).take_dropped());
        sniffer.record_queue_drops(dropped);

        // One event per lock so the RX task is never held off for a whole burst
        while let Some(event) = critical_section::with(|cs| BYTE_QUEUE.borrow_ref_mut(cs).pop()) {
            sniffer.push(event.value, event.ts_us, &mut sink);
        }
        sniffer.poll(clock.now_us(), &mut sink);
        FRAME_OPEN.store(sniffer.frame_open(), Ordering::Relaxed);

        if Instant::now() >= next_stats {
            next_stats += STATS_INTERVAL;
            if let Some(buf) = comm::encode_message(&DeviceMessage::Stats(&sniffer.stats())) {
                let _ = output_tx.try_send(buf);
            }
        }
    }
}

/// Serial output task: reads from output channel and logs to serial.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(30)).await;

        let msg = DeviceMessage::Status {
            uptime: (Instant::now().as_millis() / 1000) as u32,
            queued: queued_bytes(),
            frame_open: FRAME_OPEN.load(Ordering::Relaxed),
            board: board::BOARD_NAME,
            version: VERSION,
        };
        if let Some(buf) = comm::encode_message(&msg) {
            let _ = OUTPUT_CHANNEL.try_send(buf);
        }
    }
}
