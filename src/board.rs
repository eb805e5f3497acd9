/// Hardware abstraction for supported boards.
///
/// Each board module defines the RS-485 transceiver wiring and capabilities
/// selected at compile time via feature flags. The sniffer only listens, so
/// the driver-enable pin is held low (receive) for the life of the firmware.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const RS485_RX_PIN: u8 = 44; // D7, transceiver RO
    pub const RS485_TX_PIN: u8 = 43; // D6, transceiver DI (unused while sniffing)
    pub const RS485_DE_PIN: u8 = 4; // D3, DE + /RE tied together
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    pub const RS485_RX_PIN: u8 = 33; // Grove port (RS-485 unit)
    pub const RS485_TX_PIN: u8 = 32;
    pub const RS485_DE_PIN: u8 = 26; // Hat header
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Bus baud rate. Common RS-485 field rate; override per install.
pub const RS485_BAUD: u32 = 9600;

/// Quiet time (µs) of `chars_x10 / 10` character times at `baud` with 8N1
/// framing (10 bits per character). Useful for picking `min_gap_us`:
/// Modbus RTU, for example, delimits messages with 3.5 character times
/// (`chars_x10 = 35`).
///
/// Saturates at `u32::MAX`, which is also the answer for `baud == 0`.
pub const fn char_times_us(baud: u32, chars_x10: u32) -> u32 {
    if baud == 0 {
        return u32::MAX;
    }
    let us = 1_000_000u64 * chars_x10 as u64 / baud as u64;
    if us > u32::MAX as u64 {
        u32::MAX
    } else {
        us as u32
    }
}

/// UART RX idle timeout, in character times, programmed into the driver.
/// Keeps a partial FIFO from sitting in hardware longer than a gap.
pub const RX_TIMEOUT_CHARS: u8 = 2;

/// Worst-case delay (µs) between a byte finishing on the wire and the
/// firmware seeing it: the RX timeout plus the character itself.
pub const fn rx_latency_us(baud: u32) -> u32 {
    char_times_us(baud, (RX_TIMEOUT_CHARS as u32 + 1) * 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modbus_gap_at_9600() {
        // 3.5 chars at 9600 baud ≈ 3645 µs
        assert_eq!(char_times_us(9600, 35), 3645);
    }

    #[test]
    fn large_char_counts_saturate() {
        // 1_000_000 * 5000 overflows u32
        assert_eq!(char_times_us(9600, 5000), 520_833);
        assert_eq!(char_times_us(1, u32::MAX), u32::MAX);
    }

    #[test]
    fn zero_baud_saturates() {
        assert_eq!(char_times_us(0, 35), u32::MAX);
        assert_eq!(rx_latency_us(0), u32::MAX);
    }

    #[test]
    fn rx_latency_below_default_gap() {
        // 3 chars at 9600 baud
        assert_eq!(rx_latency_us(9600), 3125);
        assert!(rx_latency_us(RS485_BAUD) < crate::defaults::MIN_GAP_US);
    }

    #[test]
    fn board_name_present() {
        assert!(!BOARD_NAME.is_empty());
    }
}
