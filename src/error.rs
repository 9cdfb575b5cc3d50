use crate::gpio::PinMode;
use crate::i2c::{I2cAddress, I2cStatus};
use thiserror::Error;

/// Errors that can occur when using an FT260 bridge.
///
/// This enum covers connection problems, I2C bus outcomes, GPIO
/// configuration mistakes and argument validation. Argument errors are
/// always raised before any hardware access is attempted.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the underlying HID API layer.
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// No FT260 device was found with the specified vendor/product ID.
    #[error("Device not found with specified VID/PID")]
    DeviceNotFound,
    /// A matching device exists but could not be opened (e.g. claimed by another process).
    #[error("Failed to open device at '{path}': {message}")]
    DeviceOpenFail {
        /// Platform path of the device that failed to open.
        path: String,
        /// Additional error details.
        message: String,
    },
    /// The connection was closed or never established.
    #[error("Not connected to FT260")]
    NotConnected,
    /// General I/O error during device communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid or malformed HID report received from device.
    #[error("Invalid HID report received or unexpected size ({0} bytes)")]
    InvalidReport(usize),
    /// Timeout waiting for device response.
    #[error("Timeout waiting for device response")]
    Timeout,
    /// A required argument was empty or otherwise unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// GPIO line number is outside the valid range for this driver.
    #[error("GPIO line {pin} argument out of range: {message}")]
    PinArgumentOutOfRange {
        /// The invalid line number that was specified.
        pin: u8,
        /// Detailed error message explaining the constraint.
        message: String,
    },
    /// Only plain input and output are available on these lines.
    #[error("Pin mode {mode:?} is not supported on line {line}")]
    UnsupportedMode {
        /// The line the mode was requested for.
        line: u8,
        /// The rejected mode.
        mode: PinMode,
    },
    /// The line has to be opened before it can be used.
    #[error("GPIO line {line} is not open")]
    LineNotOpen {
        /// The line that was accessed.
        line: u8,
    },
    /// Slave address or data byte was not acknowledged.
    #[error(
        "No device acknowledged at I2C address {address} (status {status:?}). This is normal when scanning for devices."
    )]
    NotAcknowledged {
        /// The I2C address that sent the NACK.
        address: I2cAddress,
        /// Decoded controller status at the end of the transaction.
        status: I2cStatus,
    },
    /// Bus error, arbitration loss or another non-idle controller state.
    #[error(
        "I2C transaction failed at address {address} (status {status:?}). The controller has been reset; the operation may be retried."
    )]
    TransactionError {
        /// The I2C address being accessed.
        address: I2cAddress,
        /// Decoded controller status at the end of the transaction.
        status: I2cStatus,
    },
    /// Fewer bytes were transferred than requested.
    #[error("Incomplete I2C transfer at address {address}: expected {expected} bytes, got {actual}")]
    IncompleteTransfer {
        /// The I2C address being accessed.
        address: I2cAddress,
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually transferred.
        actual: usize,
    },
    /// The transport call itself failed; the cause is not known.
    #[error(
        "I2C transport failure at address {address}: the HID request failed. A controller reset has been attempted."
    )]
    TransportFailure {
        /// The I2C address being accessed.
        address: I2cAddress,
    },
    /// The operation sequence cannot be expressed with FT260 framing.
    #[error("Unsupported I2C transaction: {0}")]
    UnsupportedTransaction(String),
}

/// Result type alias for FT260 operations.
///
/// This is a convenience alias for `std::result::Result<T, Error>` used
/// throughout the crate to reduce boilerplate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` for outcomes that describe the bus rather than the caller:
    /// NACK, transaction errors, short transfers and transport failures.
    ///
    /// The bus scanner treats these as a negative probe and moves on.
    pub fn is_bus_failure(&self) -> bool {
        matches!(
            self,
            Error::NotAcknowledged { .. }
                | Error::TransactionError { .. }
                | Error::IncompleteTransfer { .. }
                | Error::TransportFailure { .. }
                | Error::Timeout
                | Error::Hid(_)
                | Error::Io(_)
        )
    }
}

pub(crate) fn empty_buffer(name: &str) -> Error {
    Error::InvalidArgument(format!("{} cannot be empty", name))
}
