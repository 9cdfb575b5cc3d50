//! Per-address I2C channel with strict status checking.

use crate::device::Ft260;
use crate::error::{empty_buffer, Error, Result};
use crate::i2c::{I2cAddress, I2cFlag, I2cStatus, StatusMode};
use log::debug;
use std::sync::Arc;

/// One slave address on the bridge's I2C bus.
///
/// Every operation holds the bus for its whole duration, so a
/// [`I2cDevice::write_read`] cannot interleave with another channel's
/// transfer issued from this process. Failed transfers reset the controller
/// before the error is returned; nothing is retried.
#[derive(Debug, Clone)]
pub struct I2cDevice {
    bridge: Arc<Ft260>,
    address: I2cAddress,
    mode: StatusMode,
    timeout_ms: u32,
}

impl Ft260 {
    /// Opens a channel to the 7-bit `address`.
    pub fn i2c_device(self: &Arc<Self>, address: u8) -> Result<I2cDevice> {
        Ok(I2cDevice::new(Arc::clone(self), I2cAddress::new(address)?))
    }
}

impl I2cDevice {
    pub fn new(bridge: Arc<Ft260>, address: I2cAddress) -> Self {
        let timeout_ms = bridge.config().read_timeout_ms;
        I2cDevice {
            bridge,
            address,
            mode: StatusMode::Normal,
            timeout_ms,
        }
    }

    /// Switches status handling; the scanner uses [`StatusMode::QuickScan`].
    pub fn with_status_mode(mut self, mode: StatusMode) -> Self {
        self.mode = mode;
        self
    }

    /// Overrides the per-report read timeout.
    pub fn with_read_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn address(&self) -> I2cAddress {
        self.address
    }

    pub fn bridge(&self) -> &Arc<Ft260> {
        &self.bridge
    }

    /// Reads a single byte in one complete transaction.
    pub fn read_byte(&self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    /// Fills `buffer` in one complete transaction.
    pub fn read(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.is_empty() {
            return Err(empty_buffer("Read buffer"));
        }
        let _bus = self.bridge.lock_bus();
        self.read_phase(I2cFlag::StartAndStop, buffer)
    }

    /// Writes a single byte in one complete transaction.
    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    /// Writes `data` in one complete transaction.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(empty_buffer("Write buffer"));
        }
        let _bus = self.bridge.lock_bus();
        self.write_phase(I2cFlag::StartAndStop, data)
    }

    /// Writes `write_data` without STOP, then reads `read_buffer` and releases
    /// the bus; the usual register-read pattern.
    pub fn write_read(&self, write_data: &[u8], read_buffer: &mut [u8]) -> Result<()> {
        if write_data.is_empty() {
            return Err(empty_buffer("Write buffer"));
        }
        if read_buffer.is_empty() {
            return Err(empty_buffer("Read buffer"));
        }
        let _bus = self.bridge.lock_bus();
        self.write_phase(I2cFlag::Start, write_data)?;
        self.read_phase(I2cFlag::Stop, read_buffer)
    }

    /// Address-only frame: START, address with write bit, STOP.
    ///
    /// Succeeds iff the address is acknowledged.
    pub fn quick_write(&self) -> Result<()> {
        let _bus = self.bridge.lock_bus();
        let result = self
            .bridge
            .i2c_master_write_with(self.address, I2cFlag::StartAndStop, &[], self.mode)?;
        if result.written.is_none() {
            return Err(Error::TransportFailure {
                address: self.address,
            });
        }
        self.check_status(result.status, I2cFlag::StartAndStop)
    }

    fn read_phase(&self, flag: I2cFlag, buffer: &mut [u8]) -> Result<()> {
        let result =
            self.bridge
                .i2c_master_read_with(self.address, flag, buffer.len(), self.timeout_ms, self.mode)?;
        let data = result.data.ok_or(Error::TransportFailure {
            address: self.address,
        })?;
        self.check_status(result.status, flag)?;
        if data.len() != buffer.len() {
            return Err(Error::IncompleteTransfer {
                address: self.address,
                expected: buffer.len(),
                actual: data.len(),
            });
        }
        buffer.copy_from_slice(&data);
        Ok(())
    }

    fn write_phase(&self, flag: I2cFlag, data: &[u8]) -> Result<()> {
        let result = self
            .bridge
            .i2c_master_write_with(self.address, flag, data, self.mode)?;
        let written = result.written.ok_or(Error::TransportFailure {
            address: self.address,
        })?;
        if written != data.len() {
            return Err(Error::IncompleteTransfer {
                address: self.address,
                expected: data.len(),
                actual: written,
            });
        }
        self.check_status(result.status, flag)
    }

    // Maps a non-successful status to an error after resetting the controller.
    fn check_status(&self, status: I2cStatus, flag: I2cFlag) -> Result<()> {
        if status.is_complete(flag) {
            return Ok(());
        }
        if self.mode == StatusMode::Normal {
            debug!(
                "I2C transfer to {} ended with status {:?}, resetting controller",
                self.address, status
            );
        }
        self.bridge.i2c_reset();
        if status.has_nack() {
            Err(Error::NotAcknowledged {
                address: self.address,
                status,
            })
        } else {
            Err(Error::TransactionError {
                address: self.address,
                status,
            })
        }
    }
}
