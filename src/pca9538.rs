//! Driver for the PCA9538 8-bit I2C I/O expander.

use crate::consts;
use crate::device::{lock, Ft260};
use crate::error::{Error, Result};
use crate::gpio::{GpioDirection, GpioLevel, LineDriver};
use crate::i2c_device::I2cDevice;
use log::{debug, trace};
use std::sync::{Arc, Mutex};

/// PCA9538 register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Pin levels, read only.
    InputPort,
    /// Output latch.
    OutputPort,
    /// Input polarity inversion, bit = 1 inverts.
    PolarityInversion,
    /// Direction, bit = 1 is input (power-on default 0xFF).
    Configuration,
}

impl Register {
    pub fn addr(self) -> u8 {
        match self {
            Register::InputPort => consts::pca9538::REG_INPUT_PORT,
            Register::OutputPort => consts::pca9538::REG_OUTPUT_PORT,
            Register::PolarityInversion => consts::pca9538::REG_POLARITY_INVERSION,
            Register::Configuration => consts::pca9538::REG_CONFIGURATION,
        }
    }
}

/// PCA9538 on an FT260 I2C channel, usable as a [`LineDriver`].
///
/// Direction and output changes are read-modify-write sequences on one
/// register; they are serialised by an internal lock so concurrent callers
/// (including the poll worker) cannot lose each other's bits.
#[derive(Debug)]
pub struct Pca9538 {
    device: I2cDevice,
    rmw: Mutex<()>,
}

impl Pca9538 {
    pub fn new(device: I2cDevice) -> Self {
        Pca9538 {
            device,
            rmw: Mutex::new(()),
        }
    }

    /// Expander at `address` on `bridge`.
    pub fn with_address(bridge: &Arc<Ft260>, address: u8) -> Result<Self> {
        Ok(Self::new(bridge.i2c_device(address)?))
    }

    /// Expander at the default address 0x70 (A0 = A1 = 0).
    pub fn with_default_address(bridge: &Arc<Ft260>) -> Result<Self> {
        Self::with_address(bridge, consts::pca9538::DEFAULT_ADDRESS)
    }

    pub fn device(&self) -> &I2cDevice {
        &self.device
    }

    // --- Register access ---

    pub fn read_register(&self, register: Register) -> Result<u8> {
        let mut value = [0u8; 1];
        self.device.write_read(&[register.addr()], &mut value)?;
        trace!("PCA9538 read {:?}: 0x{:02X}", register, value[0]);
        Ok(value[0])
    }

    pub fn write_register(&self, register: Register, value: u8) -> Result<()> {
        trace!("PCA9538 write {:?}: 0x{:02X}", register, value);
        self.device.write(&[register.addr(), value])
    }

    pub fn input_port(&self) -> Result<u8> {
        self.read_register(Register::InputPort)
    }

    pub fn output_port(&self) -> Result<u8> {
        self.read_register(Register::OutputPort)
    }

    pub fn set_output_port(&self, value: u8) -> Result<()> {
        let _rmw = lock(&self.rmw);
        self.write_register(Register::OutputPort, value)
    }

    pub fn polarity_inversion(&self) -> Result<u8> {
        self.read_register(Register::PolarityInversion)
    }

    pub fn set_polarity_inversion(&self, value: u8) -> Result<()> {
        let _rmw = lock(&self.rmw);
        self.write_register(Register::PolarityInversion, value)
    }

    pub fn configuration(&self) -> Result<u8> {
        self.read_register(Register::Configuration)
    }

    pub fn set_configuration(&self, value: u8) -> Result<()> {
        let _rmw = lock(&self.rmw);
        self.write_register(Register::Configuration, value)
    }

    // Exactly one read and one write of `register`; only `bit` changes.
    fn modify_bit(&self, register: Register, bit: u8, set: bool) -> Result<()> {
        let _rmw = lock(&self.rmw);
        let current = self.read_register(register)?;
        let updated = if set {
            current | (1 << bit)
        } else {
            current & !(1 << bit)
        };
        self.write_register(register, updated)
    }

    fn check_line(&self, line: u8) -> Result<()> {
        if line < consts::pca9538::LINE_COUNT {
            Ok(())
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: line,
                message: "PCA9538 line must be 0-7".to_string(),
            })
        }
    }
}

impl LineDriver for Pca9538 {
    fn line_count(&self) -> u8 {
        consts::pca9538::LINE_COUNT
    }

    fn open_line(&self, line: u8) -> Result<()> {
        self.check_line(line)
    }

    fn close_line(&self, line: u8) -> Result<()> {
        self.check_line(line)
    }

    fn set_direction(&self, line: u8, direction: GpioDirection) -> Result<()> {
        self.check_line(line)?;
        debug!(
            "PCA9538 {} line {} direction: {:?}",
            self.device.address(),
            line,
            direction
        );
        self.modify_bit(
            Register::Configuration,
            line,
            direction == GpioDirection::Input,
        )
    }

    fn direction(&self, line: u8) -> Result<GpioDirection> {
        self.check_line(line)?;
        Ok(if self.configuration()? & (1 << line) != 0 {
            GpioDirection::Input
        } else {
            GpioDirection::Output
        })
    }

    fn read(&self, line: u8) -> Result<GpioLevel> {
        self.check_line(line)?;
        Ok(GpioLevel::from(self.input_port()? & (1 << line) != 0))
    }

    fn write(&self, line: u8, level: GpioLevel) -> Result<()> {
        self.check_line(line)?;
        self.modify_bit(Register::OutputPort, line, level.is_high())
    }

    // One input-port read per poll cycle.
    fn read_lines(&self, lines: &[u8]) -> Result<Vec<GpioLevel>> {
        for &line in lines {
            self.check_line(line)?;
        }
        let port = self.input_port()?;
        Ok(lines
            .iter()
            .map(|&line| GpioLevel::from(port & (1 << line) != 0))
            .collect())
    }
}
