//! Internal constants, HID report IDs, and bit definitions.

use std::time::Duration;

// Default Vendor/Product IDs
/// FTDI vendor ID.
pub const FTDI_VID: u16 = 0x0403;
/// Product ID of the FT260 HID bridge.
pub const FT260_PID: u16 = 0x6030;
/// HID interface carrying the I2C master and GPIO functions.
pub const FT260_I2C_INTERFACE: i32 = 0;

// --- Feature Reports (Control Transfer) ---
pub const REPORT_ID_CHIP_VERSION: u8 = 0xA0;
pub const REPORT_ID_SYSTEM_SETTING: u8 = 0xA1;
pub const REPORT_ID_GPIO: u8 = 0xB0;
pub const REPORT_ID_I2C_STATUS: u8 = 0xC0;

pub const CHIP_VERSION_REPORT_SIZE: usize = 13;
pub const GPIO_REPORT_SIZE: usize = 5;
pub const I2C_STATUS_REPORT_SIZE: usize = 5;
// Shortest replies that still carry every byte we decode.
pub const CHIP_VERSION_MIN_LEN: usize = 5;
pub const I2C_STATUS_MIN_LEN: usize = 2;

// System setting sub-commands (byte 1 of report 0xA1)
pub mod system {
    pub const SET_CLOCK: u8 = 0x01;
    pub const SET_I2C_MODE: u8 = 0x02;
    pub const SET_UART_MODE: u8 = 0x03;
    pub const ENABLE_INTERRUPT: u8 = 0x05;
    pub const SELECT_GPIO2_FUNCTION: u8 = 0x06;
    pub const ENABLE_UART_DCD_RI: u8 = 0x07;
    pub const SELECT_GPIOA_FUNCTION: u8 = 0x08;
    pub const SELECT_GPIOG_FUNCTION: u8 = 0x09;
    pub const I2C_RESET: u8 = 0x20;
    pub const SET_I2C_CLOCK_SPEED: u8 = 0x22;

    // UART mode values used when handing the UART pin block to GPIO and back.
    pub const UART_MODE_OFF: u8 = 0x00;
    pub const UART_MODE_RTS_CTS: u8 = 0x01;
}

// --- I2C Related Constants ---
pub mod i2c {
    use std::time::Duration;

    // Output report requesting a read from a slave.
    pub const REPORT_ID_READ_REQUEST: u8 = 0xC2;
    // Data reports 0xD0..=0xDE; each step adds 4 bytes of payload capacity.
    pub const REPORT_ID_DATA_FIRST: u8 = 0xD0;
    pub const REPORT_ID_DATA_LAST: u8 = 0xDE;
    pub const REPORT_MAX_DATA_SIZE: usize = 60;
    // ReportID(1) + SlaveAddr(1) + Flag(1) + Len(1) + Data(60)
    pub const OUT_REPORT_HEADER_SIZE: usize = 4;
    // ReportID(1) + Len(1) + Data(60)
    pub const IN_REPORT_HEADER_SIZE: usize = 2;
    pub const IN_REPORT_BUF_SIZE: usize = 64;
    // Unrelated or empty input reports tolerated during one read.
    pub const MAX_SKIPPED_REPORTS: usize = 16;

    // Framing bits of the I2C condition byte
    pub mod flag_bits {
        pub const NONE: u8 = 0x00;
        pub const START: u8 = 0x02;
        pub const REPEATED_START: u8 = 0x03;
        pub const STOP: u8 = 0x04;
        pub const START_AND_STOP: u8 = 0x06;
        pub const START_MASK: u8 = 0x03;
    }

    // I2C master controller status bits (byte 1 of report 0xC0)
    pub mod status_bits {
        pub const BUSY: u8 = 0x01;
        pub const ERROR: u8 = 0x02;
        pub const ADDRESS_NACK: u8 = 0x04;
        pub const DATA_NACK: u8 = 0x08;
        pub const ARBITRATION_LOST: u8 = 0x10;
        pub const IDLE: u8 = 0x20;
        pub const BUS_BUSY: u8 = 0x40;
    }

    pub const MIN_CLOCK_KBPS: u32 = 100;
    pub const MAX_CLOCK_KBPS: u32 = 4000;

    pub const DEFAULT_READ_TIMEOUT_MS: u32 = 5000;
    pub const DEFAULT_STATUS_RETRIES: u32 = 10;
    pub const DEFAULT_STATUS_RETRY_DELAY: Duration = Duration::from_millis(50);

    // Conventional scan window, excluding reserved addresses at both ends.
    pub const SCAN_FIRST_ADDRESS: u8 = 0x03;
    pub const SCAN_LAST_ADDRESS: u8 = 0x77;
    pub const MAX_7BIT_ADDRESS: u8 = 0x7F;
    // ACK/NACK is immediate, but the HID layer needs a little time.
    pub const SCAN_READ_TIMEOUT_MS: u32 = 25;
}

// --- GPIO Related Constants ---
pub mod gpio {
    /// Lines 0-5 live in the GPIO0..5 bytes, 6-13 in the GPIOA..H bytes.
    pub const BRIDGE_LINE_COUNT: u8 = 14;
    pub const BRIDGE_LOW_GROUP_COUNT: u8 = 6;

    // Function select values
    pub const GPIO2_GPIO: u8 = 0;
    pub const GPIO2_SUSPOUT: u8 = 1;
    pub const GPIO2_PWREN: u8 = 2;
    pub const GPIO2_TX_LED: u8 = 4;
    pub const GPIOA_GPIO: u8 = 0;
    pub const GPIOA_TX_ACTIVE: u8 = 3;
    pub const GPIOA_TX_LED: u8 = 4;
    pub const GPIOG_GPIO: u8 = 0;
    pub const GPIOG_PWREN: u8 = 2;
    pub const GPIOG_RX_LED: u8 = 5;
    pub const GPIOG_BCD_DET: u8 = 6;
}

// --- PCA9538 I/O expander ---
pub mod pca9538 {
    pub const REG_INPUT_PORT: u8 = 0x00;
    pub const REG_OUTPUT_PORT: u8 = 0x01;
    pub const REG_POLARITY_INVERSION: u8 = 0x02;
    pub const REG_CONFIGURATION: u8 = 0x03;
    pub const LINE_COUNT: u8 = 8;
    pub const DEFAULT_ADDRESS: u8 = 0x70;
}

/// Interval of the pin-change poll loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
