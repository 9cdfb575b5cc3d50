//! `embedded-hal` 1.0 I2C implementation, so sensor and display driver crates
//! can run on top of the bridge.

use crate::device::Ft260;
use crate::error::{Error, Result};
use crate::i2c::I2cAddress;
use crate::i2c_device::I2cDevice;
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};
use std::sync::Arc;

impl i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAcknowledged { status, .. } if status.is_address_nack() => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            Error::NotAcknowledged { status, .. } if status.is_data_nack() => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)
            }
            Error::NotAcknowledged { .. } => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::TransactionError { status, .. } if status.is_arbitration_lost() => {
                ErrorKind::ArbitrationLoss
            }
            Error::TransactionError { .. } => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}

/// The bridge's I2C bus as an [`embedded_hal::i2c::I2c`] implementation.
///
/// Supported transactions are a single write, a single read, and a write
/// followed by a read (repeated start). An empty write is sent as an
/// address-only frame.
#[derive(Debug, Clone)]
pub struct I2cBus {
    bridge: Arc<Ft260>,
}

impl I2cBus {
    pub fn new(bridge: Arc<Ft260>) -> Self {
        I2cBus { bridge }
    }

    fn device(&self, address: SevenBitAddress) -> Result<I2cDevice> {
        Ok(I2cDevice::new(
            Arc::clone(&self.bridge),
            I2cAddress::new(address)?,
        ))
    }
}

impl i2c::ErrorType for I2cBus {
    type Error = Error;
}

impl I2c<SevenBitAddress> for I2cBus {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<()> {
        let device = self.device(address)?;
        let count = operations.len();
        match operations {
            [Operation::Write(data)] if data.is_empty() => device.quick_write(),
            [Operation::Write(data)] => device.write(data),
            [Operation::Read(buffer)] => device.read(buffer),
            [Operation::Write(data), Operation::Read(buffer)] => device.write_read(data, buffer),
            _ => Err(Error::UnsupportedTransaction(format!(
                "{} operations; only write, read and write-read are supported",
                count
            ))),
        }
    }
}
