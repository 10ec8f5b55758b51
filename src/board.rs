/// Hardware abstraction for supported boards.
///
/// Each board module defines the GPS UART wiring and capabilities
/// selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const GPS_RX_PIN: u8 = 6;
    pub const GPS_TX_PIN: u8 = 5;
    pub const GPS_BAUD: u32 = 9600;
    pub const HAS_GPS_HEADER: bool = true;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    // Grove port; only populated when an external GPS is plugged in.
    pub const GPS_RX_PIN: u8 = 33;
    pub const GPS_TX_PIN: u8 = 32;
    pub const GPS_BAUD: u32 = 9600;
    pub const HAS_GPS_HEADER: bool = false;
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const GPS_RX_PIN: u8 = 0;
    pub const GPS_TX_PIN: u8 = 0;
    pub const GPS_BAUD: u32 = 9600;
    pub const HAS_GPS_HEADER: bool = false;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
