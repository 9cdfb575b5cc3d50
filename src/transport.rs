//! The primitive command set of the bridge chip.
//!
//! [`Transport`] is the seam between the typed API in this crate and the
//! wire: [`crate::HidTransport`] speaks FT260 HID reports through `hidapi`,
//! and tests substitute a recording fake. Implementations report raw
//! outcomes only; status decoding, recovery and retry live in [`crate::Ft260`].

use crate::error::Result;
use crate::gpio::{BridgePin, GpioDirection, GpioLevel, Gpio2Function, GpioAFunction, GpioGFunction};
use crate::i2c::I2cFlag;

/// FT260 system clock selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemClock {
    /// 12 MHz.
    Mhz12,
    /// 24 MHz.
    Mhz24,
    /// 48 MHz (power-on default).
    Mhz48,
}

impl SystemClock {
    /// Raw value used in the system setting request.
    pub fn value(self) -> u8 {
        match self {
            SystemClock::Mhz12 => 0,
            SystemClock::Mhz24 => 1,
            SystemClock::Mhz48 => 2,
        }
    }
}

/// Raw bridge primitives.
///
/// Every method maps to one vendor command. Callers serialise access; the
/// trait takes `&mut self` and [`crate::Ft260`] keeps it behind a mutex.
pub trait Transport: Send {
    /// Chip code reported by the device (e.g. `0x0260_0200`).
    fn chip_version(&mut self) -> Result<u32>;
    /// Selects the system clock.
    fn set_clock(&mut self, clock: SystemClock) -> Result<()>;

    /// Configures the I2C master clock in kbit/s.
    fn i2c_master_init(&mut self, clock_kbps: u32) -> Result<()>;
    /// Reads up to `buffer.len()` bytes; returns the number of bytes received.
    fn i2c_master_read(
        &mut self,
        address: u8,
        flag: I2cFlag,
        buffer: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize>;
    /// Writes `data` (possibly empty for an address-only frame); returns bytes written.
    fn i2c_master_write(&mut self, address: u8, flag: I2cFlag, data: &[u8]) -> Result<usize>;
    /// Raw I2C master status byte.
    fn i2c_master_status(&mut self) -> Result<u8>;
    /// Resets the I2C master state machine.
    fn i2c_master_reset(&mut self) -> Result<()>;

    /// Hands GPIO0/GPIO1 to the I2C function (`true`) or back to GPIO.
    fn enable_i2c_pins(&mut self, enable: bool) -> Result<()>;
    /// Selects the function of the GPIO2 pin.
    fn select_gpio2_function(&mut self, function: Gpio2Function) -> Result<()>;
    /// Selects the function of the GPIOA pin.
    fn select_gpioa_function(&mut self, function: GpioAFunction) -> Result<()>;
    /// Selects the function of the GPIOG pin.
    fn select_gpiog_function(&mut self, function: GpioGFunction) -> Result<()>;
    /// Enables (`true`) or disables the wakeup/interrupt function of GPIO3.
    fn enable_wakeup_interrupt(&mut self, enable: bool) -> Result<()>;
    /// Enables (`true`) or disables the DCD/RI function of GPIO4/GPIO5.
    fn enable_dcd_ri(&mut self, enable: bool) -> Result<()>;
    /// Hands the UART pin block (GPIOB-F, GPIOH) to GPIO (`true`) or back to UART.
    fn set_uart_pins_gpio(&mut self, to_gpio: bool) -> Result<()>;

    /// Sets the direction of one GPIO line in the GPIO feature report.
    fn gpio_set_dir(&mut self, pin: BridgePin, direction: GpioDirection) -> Result<()>;
    /// Direction bit of one GPIO line.
    fn gpio_get_dir(&mut self, pin: BridgePin) -> Result<GpioDirection>;
    /// Input level of one GPIO line.
    fn gpio_read(&mut self, pin: BridgePin) -> Result<GpioLevel>;
    /// Sets the output latch of one GPIO line.
    fn gpio_write(&mut self, pin: BridgePin, level: GpioLevel) -> Result<()>;
}
