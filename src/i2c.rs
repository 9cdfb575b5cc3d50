//! I2C master functionality of the FT260: addressing, framing, status decoding
//! and the raw read/write primitives with controller recovery.

use crate::consts;
use crate::device::Ft260;
use crate::error::{Error, Result};
use crate::gpio::FunctionGroup;
use bitflags::bitflags;
use log::{debug, trace, warn};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Represents a 7-bit I2C slave address.
/// Use `I2cAddress::new(addr)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct I2cAddress(u8);

impl I2cAddress {
    /// Creates a 7-bit address, checking validity (0-127).
    pub fn new(addr: u8) -> Result<Self> {
        if addr <= consts::i2c::MAX_7BIT_ADDRESS {
            Ok(I2cAddress(addr))
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "7-bit I2C address must be 0-127, got 0x{:02X}",
                addr
            )))
        }
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }

    /// `true` for 0x00-0x02 and 0x78-0x7F, which the scanner skips by default.
    pub fn is_reserved(&self) -> bool {
        self.0 < consts::i2c::SCAN_FIRST_ADDRESS || self.0 > consts::i2c::SCAN_LAST_ADDRESS
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Start/stop framing of a single read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cFlag {
    /// No condition; continues a transaction already in progress.
    None,
    /// START without STOP; the bus stays held afterwards.
    Start,
    /// Repeated START, e.g. turning a write into a read.
    RepeatedStart,
    /// STOP only; ends a held transaction.
    Stop,
    /// A complete transaction.
    StartAndStop,
}

impl I2cFlag {
    /// Condition byte sent to the bridge.
    pub fn bits(self) -> u8 {
        use consts::i2c::flag_bits;
        match self {
            I2cFlag::None => flag_bits::NONE,
            I2cFlag::Start => flag_bits::START,
            I2cFlag::RepeatedStart => flag_bits::REPEATED_START,
            I2cFlag::Stop => flag_bits::STOP,
            I2cFlag::StartAndStop => flag_bits::START_AND_STOP,
        }
    }

    /// `true` if the bus is released when the transfer ends.
    pub fn releases_bus(self) -> bool {
        matches!(self, I2cFlag::Stop | I2cFlag::StartAndStop)
    }

    /// `true` if the transfer continues a transaction whose bus is still held.
    pub fn continues_transaction(self) -> bool {
        matches!(self, I2cFlag::None | I2cFlag::RepeatedStart | I2cFlag::Stop)
    }
}

bitflags! {
    /// Decoded I2C master controller status.
    ///
    /// The flags are not mutually exclusive. A plain `IDLE` is the only
    /// success state for a transfer that released the bus; an empty set means
    /// the status could not be obtained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct I2cStatus: u8 {
        const BUSY = consts::i2c::status_bits::BUSY;
        const ERROR = consts::i2c::status_bits::ERROR;
        const ADDRESS_NACK = consts::i2c::status_bits::ADDRESS_NACK;
        const DATA_NACK = consts::i2c::status_bits::DATA_NACK;
        const ARBITRATION_LOST = consts::i2c::status_bits::ARBITRATION_LOST;
        const IDLE = consts::i2c::status_bits::IDLE;
        const BUS_BUSY = consts::i2c::status_bits::BUS_BUSY;
    }
}

impl I2cStatus {
    /// Status of a transfer whose outcome is not known.
    pub const UNKNOWN: I2cStatus = I2cStatus::empty();

    /// Exactly `IDLE`, nothing else set.
    pub fn is_idle(self) -> bool {
        self == I2cStatus::IDLE
    }

    /// Success for a transfer framed with `flag`.
    ///
    /// A transfer that keeps the bus (e.g. the write half of a write-read)
    /// legitimately ends with `BUS_BUSY` alongside `IDLE`.
    pub fn is_complete(self, flag: I2cFlag) -> bool {
        self.is_idle() || (!flag.releases_bus() && self == I2cStatus::IDLE | I2cStatus::BUS_BUSY)
    }

    /// The controller can start a transfer framed with `flag` without a reset.
    pub fn is_ready_for(self, flag: I2cFlag) -> bool {
        self.is_idle()
            || (flag.continues_transaction() && self == I2cStatus::IDLE | I2cStatus::BUS_BUSY)
    }

    pub fn is_error(self) -> bool {
        self.contains(I2cStatus::ERROR)
    }

    /// Address or data NACK.
    pub fn has_nack(self) -> bool {
        self.intersects(I2cStatus::ADDRESS_NACK | I2cStatus::DATA_NACK)
    }

    pub fn is_address_nack(self) -> bool {
        self.contains(I2cStatus::ADDRESS_NACK)
    }

    pub fn is_data_nack(self) -> bool {
        self.contains(I2cStatus::DATA_NACK)
    }

    /// The controller itself is busy.
    pub fn is_busy(self) -> bool {
        self.contains(I2cStatus::BUSY)
    }

    pub fn is_arbitration_lost(self) -> bool {
        self.contains(I2cStatus::ARBITRATION_LOST)
    }

    /// The bus is held (by this or another master).
    pub fn is_bus_busy(self) -> bool {
        self.contains(I2cStatus::BUS_BUSY)
    }

    pub fn is_unknown(self) -> bool {
        self.is_empty()
    }

    // Nothing will change by waiting longer.
    fn is_final(self, flag: I2cFlag) -> bool {
        self.is_complete(flag) || (self.is_error() && !self.is_busy())
    }

    fn log_flags(self) {
        if self.is_busy() {
            debug!("I2C status: controller busy");
        }
        if self.is_error() {
            debug!("I2C status: error condition");
        }
        if self.is_address_nack() {
            debug!("I2C status: slave address not acknowledged");
        }
        if self.is_data_nack() {
            debug!("I2C status: data not acknowledged");
        }
        if self.is_arbitration_lost() {
            debug!("I2C status: arbitration lost");
        }
        if self.is_bus_busy() {
            debug!("I2C status: bus busy");
        }
    }
}

/// How status is obtained around a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusMode {
    /// Wait for the controller to settle and log the decoded flags.
    #[default]
    Normal,
    /// Single-shot status read without logging, for bus scanning.
    QuickScan,
}

/// Timing of status polling and reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cConfig {
    /// How many extra status reads to do while the controller is still working.
    pub status_retries: u32,
    /// Delay between those status reads.
    pub status_retry_delay: Duration,
    /// Timeout for each input report during a read.
    pub read_timeout_ms: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            status_retries: consts::i2c::DEFAULT_STATUS_RETRIES,
            status_retry_delay: consts::i2c::DEFAULT_STATUS_RETRY_DELAY,
            read_timeout_ms: consts::i2c::DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl I2cConfig {
    /// No status wait and a short read timeout; suited to fakes and fast buses.
    pub fn fast() -> Self {
        Self {
            status_retries: 0,
            status_retry_delay: Duration::ZERO,
            read_timeout_ms: 500,
        }
    }
}

/// Outcome of [`Ft260::i2c_master_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRead {
    /// Bytes received, `None` if the transport call failed.
    pub data: Option<Vec<u8>>,
    pub status: I2cStatus,
}

/// Outcome of [`Ft260::i2c_master_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterWrite {
    /// Bytes accepted, `None` if the transport call failed.
    pub written: Option<usize>,
    pub status: I2cStatus,
}

impl Ft260 {
    // --- I2C Methods ---

    /// Configures the I2C master clock (100-4000 kbit/s) and hands GPIO0/GPIO1
    /// to the I2C function. Call once before any I2C transfer.
    pub fn i2c_master_init(&self, clock_kbps: u32) -> Result<()> {
        if !(consts::i2c::MIN_CLOCK_KBPS..=consts::i2c::MAX_CLOCK_KBPS).contains(&clock_kbps) {
            return Err(Error::ArgumentOutOfRange(format!(
                "I2C clock {} kbit/s out of range ({}-{})",
                clock_kbps,
                consts::i2c::MIN_CLOCK_KBPS,
                consts::i2c::MAX_CLOCK_KBPS
            )));
        }
        debug!("Initialising I2C master at {} kbit/s", clock_kbps);
        let mut claimed = self.claimed_lines();
        self.with_transport(|t| {
            t.enable_i2c_pins(true)?;
            t.i2c_master_init(clock_kbps)
        })?;
        *claimed &= !FunctionGroup::I2c.mask();
        Ok(())
    }

    /// Reads the controller status.
    ///
    /// In [`StatusMode::Normal`] the status is re-read while the controller is
    /// still working, up to `status_retries` times `status_retry_delay`.
    pub fn i2c_status(&self, mode: StatusMode) -> Result<I2cStatus> {
        self.settle_status(mode, |s| s.is_final(I2cFlag::StartAndStop))
    }

    /// Resets the I2C master state machine. Failures are logged, not returned.
    pub fn i2c_reset(&self) {
        match self.with_transport(|t| t.i2c_master_reset()) {
            Ok(()) => debug!("I2C controller reset"),
            Err(e) => warn!("I2C controller reset failed: {}", e),
        }
    }

    /// Reads `len` bytes with the configured timeout and normal status handling.
    pub fn i2c_master_read(&self, address: I2cAddress, flag: I2cFlag, len: usize) -> Result<MasterRead> {
        self.i2c_master_read_with(address, flag, len, self.config().read_timeout_ms, StatusMode::Normal)
    }

    /// Reads `len` bytes.
    ///
    /// The controller is reset first unless it is ready for `flag`. A failed
    /// transport call resets the controller and yields `data: None` with
    /// [`I2cStatus::UNKNOWN`]. Only [`Error::NotConnected`] is returned as an error.
    pub fn i2c_master_read_with(
        &self,
        address: I2cAddress,
        flag: I2cFlag,
        len: usize,
        timeout_ms: u32,
        mode: StatusMode,
    ) -> Result<MasterRead> {
        self.prepare_transfer(address, flag, mode)?;
        trace!("I2C read {}: {} bytes, flag {:?}", address, len, flag);
        let mut buffer = vec![0u8; len];
        let received = self.with_transport(|t| {
            t.i2c_master_read(address.value(), flag, &mut buffer, timeout_ms)
        });
        let received = match received {
            Ok(n) => n,
            Err(Error::NotConnected) => return Err(Error::NotConnected),
            Err(e) => {
                if mode == StatusMode::Normal {
                    warn!("I2C read from {} failed: {}", address, e);
                }
                self.i2c_reset();
                return Ok(MasterRead {
                    data: None,
                    status: I2cStatus::UNKNOWN,
                });
            }
        };
        buffer.truncate(received);
        let status = self.transfer_status(flag, mode)?;
        debug!(
            "I2C read {}: {} of {} bytes, status {:?}",
            address, received, len, status
        );
        Ok(MasterRead {
            data: Some(buffer),
            status,
        })
    }

    /// Writes `data` with normal status handling.
    pub fn i2c_master_write(&self, address: I2cAddress, flag: I2cFlag, data: &[u8]) -> Result<MasterWrite> {
        self.i2c_master_write_with(address, flag, data, StatusMode::Normal)
    }

    /// Writes `data`; an empty slice produces an address-only frame.
    ///
    /// Recovery follows [`Ft260::i2c_master_read_with`].
    pub fn i2c_master_write_with(
        &self,
        address: I2cAddress,
        flag: I2cFlag,
        data: &[u8],
        mode: StatusMode,
    ) -> Result<MasterWrite> {
        self.prepare_transfer(address, flag, mode)?;
        trace!("I2C write {}: {:02X?}, flag {:?}", address, data, flag);
        let written = match self.with_transport(|t| t.i2c_master_write(address.value(), flag, data)) {
            Ok(n) => n,
            Err(Error::NotConnected) => return Err(Error::NotConnected),
            Err(e) => {
                if mode == StatusMode::Normal {
                    warn!("I2C write to {} failed: {}", address, e);
                }
                self.i2c_reset();
                return Ok(MasterWrite {
                    written: None,
                    status: I2cStatus::UNKNOWN,
                });
            }
        };
        let status = self.transfer_status(flag, mode)?;
        debug!(
            "I2C write {}: {} of {} bytes, status {:?}",
            address,
            written,
            data.len(),
            status
        );
        Ok(MasterWrite {
            written: Some(written),
            status,
        })
    }

    // Resets the controller unless it can take a transfer framed with `flag`.
    fn prepare_transfer(&self, address: I2cAddress, flag: I2cFlag, mode: StatusMode) -> Result<()> {
        let prior = self.settle_status(mode, |s| s.is_ready_for(flag) || s.is_final(flag))?;
        if !prior.is_ready_for(flag) {
            if mode == StatusMode::Normal {
                warn!(
                    "I2C controller not ready before transfer to {} (status {:?}), resetting",
                    address, prior
                );
            }
            self.i2c_reset();
        }
        Ok(())
    }

    fn transfer_status(&self, flag: I2cFlag, mode: StatusMode) -> Result<I2cStatus> {
        self.settle_status(mode, |s| s.is_final(flag))
    }

    fn read_status(&self, mode: StatusMode) -> Result<I2cStatus> {
        let status = match self.with_transport(|t| t.i2c_master_status()) {
            Ok(raw) => I2cStatus::from_bits_retain(raw),
            Err(Error::NotConnected) => return Err(Error::NotConnected),
            Err(e) => {
                if mode == StatusMode::Normal {
                    warn!("Reading I2C status failed: {}", e);
                }
                I2cStatus::UNKNOWN
            }
        };
        if mode == StatusMode::Normal {
            status.log_flags();
        }
        Ok(status)
    }

    fn settle_status(&self, mode: StatusMode, done: impl Fn(I2cStatus) -> bool) -> Result<I2cStatus> {
        let mut status = self.read_status(mode)?;
        if mode == StatusMode::QuickScan {
            return Ok(status);
        }
        let config = self.config();
        let mut attempts = 0;
        while !done(status) && attempts < config.status_retries {
            attempts += 1;
            trace!(
                "Waiting for I2C controller (status {:?}, attempt {}/{})",
                status,
                attempts,
                config.status_retries
            );
            thread::sleep(config.status_retry_delay);
            status = self.read_status(mode)?;
        }
        Ok(status)
    }
}
