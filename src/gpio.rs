//! GPIO lines of the bridge chip and the line contract shared with expanders.
//!
//! The FT260 has 14 GPIO lines, each multiplexed with another function:
//!
//! | Line | Pin   | Other functions            |
//! |------|-------|----------------------------|
//! | 0    | GPIO0 | I2C SCL                    |
//! | 1    | GPIO1 | I2C SDA                    |
//! | 2    | GPIO2 | SUSPOUT / PWREN / TX_LED   |
//! | 3    | GPIO3 | WAKEUP / INTR              |
//! | 4    | GPIO4 | UART DCD                   |
//! | 5    | GPIO5 | UART RI                    |
//! | 6    | GPIOA | TX_ACTIVE / TX_LED         |
//! | 7    | GPIOB | UART RTS_N                 |
//! | 8    | GPIOC | UART RXD                   |
//! | 9    | GPIOD | UART TXD                   |
//! | 10   | GPIOE | UART CTS_N                 |
//! | 11   | GPIOF | UART DTR_N                 |
//! | 12   | GPIOG | BCD_DET / RX_LED / PWREN   |
//! | 13   | GPIOH | UART DSR_N                 |
//!
//! A line is switched to GPIO the first time it is used and the switch is
//! remembered, so repeated opens issue no further function-select requests.

use crate::consts;
use crate::device::Ft260;
use crate::error::{Error, Result};
use crate::transport::Transport;
use log::{debug, trace};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

impl GpioLevel {
    #[inline]
    pub fn is_high(self) -> bool {
        self == GpioLevel::High
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

/// Electrical mode requested for a line.
///
/// Bridge and expander lines support only plain `Input` and `Output`; the
/// other modes are rejected with [`Error::UnsupportedMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
    InputPullUp,
    InputPullDown,
    OutputOpenDrain,
}

impl PinMode {
    /// Direction for the supported modes, `None` otherwise.
    pub fn direction(self) -> Option<GpioDirection> {
        match self {
            PinMode::Input => Some(GpioDirection::Input),
            PinMode::Output => Some(GpioDirection::Output),
            _ => None,
        }
    }
}

/// Direction of an observed level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEdge {
    Rising,
    Falling,
}

impl PinEdge {
    /// The edge that ends at `level`.
    pub fn towards(level: GpioLevel) -> Self {
        match level {
            GpioLevel::High => PinEdge::Rising,
            GpioLevel::Low => PinEdge::Falling,
        }
    }
}

// --- Function select values ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gpio2Function {
    Gpio,
    SuspendOut,
    PowerEnable,
    TxLed,
}

impl Gpio2Function {
    pub fn value(self) -> u8 {
        match self {
            Gpio2Function::Gpio => consts::gpio::GPIO2_GPIO,
            Gpio2Function::SuspendOut => consts::gpio::GPIO2_SUSPOUT,
            Gpio2Function::PowerEnable => consts::gpio::GPIO2_PWREN,
            Gpio2Function::TxLed => consts::gpio::GPIO2_TX_LED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioAFunction {
    Gpio,
    TxActive,
    TxLed,
}

impl GpioAFunction {
    pub fn value(self) -> u8 {
        match self {
            GpioAFunction::Gpio => consts::gpio::GPIOA_GPIO,
            GpioAFunction::TxActive => consts::gpio::GPIOA_TX_ACTIVE,
            GpioAFunction::TxLed => consts::gpio::GPIOA_TX_LED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioGFunction {
    Gpio,
    PowerEnable,
    RxLed,
    BcdDetect,
}

impl GpioGFunction {
    pub fn value(self) -> u8 {
        match self {
            GpioGFunction::Gpio => consts::gpio::GPIOG_GPIO,
            GpioGFunction::PowerEnable => consts::gpio::GPIOG_PWREN,
            GpioGFunction::RxLed => consts::gpio::GPIOG_RX_LED,
            GpioGFunction::BcdDetect => consts::gpio::GPIOG_BCD_DET,
        }
    }
}

/// Lines that share one function-select switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionGroup {
    /// Lines 0-1 (SCL/SDA).
    I2c,
    /// Line 2.
    Gpio2,
    /// Line 3.
    Wakeup,
    /// Lines 4-5.
    DcdRi,
    /// Line 6.
    GpioA,
    /// Lines 7-11 and 13.
    Uart,
    /// Line 12.
    GpioG,
}

impl FunctionGroup {
    /// Bit mask of the lines in this group.
    pub fn mask(self) -> u16 {
        match self {
            FunctionGroup::I2c => 0b0000_0000_0011,
            FunctionGroup::Gpio2 => 0b0000_0000_0100,
            FunctionGroup::Wakeup => 0b0000_0000_1000,
            FunctionGroup::DcdRi => 0b0000_0011_0000,
            FunctionGroup::GpioA => 0b0000_0100_0000,
            FunctionGroup::Uart => 0b10_1111_1000_0000,
            FunctionGroup::GpioG => 0b01_0000_0000_0000,
        }
    }

    // Switches the group's pins to GPIO.
    pub(crate) fn claim(self, transport: &mut dyn Transport) -> Result<()> {
        match self {
            FunctionGroup::I2c => transport.enable_i2c_pins(false),
            FunctionGroup::Gpio2 => transport.select_gpio2_function(Gpio2Function::Gpio),
            FunctionGroup::Wakeup => transport.enable_wakeup_interrupt(false),
            FunctionGroup::DcdRi => transport.enable_dcd_ri(false),
            FunctionGroup::GpioA => transport.select_gpioa_function(GpioAFunction::Gpio),
            FunctionGroup::Uart => transport.set_uart_pins_gpio(true),
            FunctionGroup::GpioG => transport.select_gpiog_function(GpioGFunction::Gpio),
        }
    }

    // Restores the datasheet default function.
    pub(crate) fn release(self, transport: &mut dyn Transport) -> Result<()> {
        match self {
            FunctionGroup::I2c => transport.enable_i2c_pins(true),
            FunctionGroup::Gpio2 => transport.select_gpio2_function(Gpio2Function::SuspendOut),
            FunctionGroup::Wakeup => transport.enable_wakeup_interrupt(true),
            FunctionGroup::DcdRi => transport.enable_dcd_ri(true),
            FunctionGroup::GpioA => transport.select_gpioa_function(GpioAFunction::TxActive),
            FunctionGroup::Uart => transport.set_uart_pins_gpio(false),
            FunctionGroup::GpioG => transport.select_gpiog_function(GpioGFunction::BcdDetect),
        }
    }
}

/// Represents a valid bridge GPIO line (0-13).
/// Use `BridgePin::new(num)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgePin(u8);

impl BridgePin {
    /// Creates a new BridgePin, returning an error if the number is out of range (0-13).
    pub fn new(pin_num: u8) -> Result<Self> {
        if pin_num < consts::gpio::BRIDGE_LINE_COUNT {
            Ok(BridgePin(pin_num))
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: pin_num,
                message: "Bridge line must be 0-13".to_string(),
            })
        }
    }

    /// Returns the underlying line number (0-13).
    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Bit mask (1 << number) in the 14-bit line set.
    #[inline]
    pub fn mask(&self) -> u16 {
        1u16 << self.0
    }

    /// `true` for GPIO0..5, which live in the first pair of GPIO report bytes.
    #[inline]
    pub fn in_low_group(&self) -> bool {
        self.0 < consts::gpio::BRIDGE_LOW_GROUP_COUNT
    }

    /// Bit index within its GPIO report byte.
    #[inline]
    pub fn report_bit(&self) -> u8 {
        if self.in_low_group() {
            self.0
        } else {
            self.0 - consts::gpio::BRIDGE_LOW_GROUP_COUNT
        }
    }

    /// Function-select group the line belongs to.
    pub fn function_group(&self) -> FunctionGroup {
        match self.0 {
            0 | 1 => FunctionGroup::I2c,
            2 => FunctionGroup::Gpio2,
            3 => FunctionGroup::Wakeup,
            4 | 5 => FunctionGroup::DcdRi,
            6 => FunctionGroup::GpioA,
            12 => FunctionGroup::GpioG,
            _ => FunctionGroup::Uart,
        }
    }

    /// Datasheet pin name.
    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 14] = [
            "GPIO0", "GPIO1", "GPIO2", "GPIO3", "GPIO4", "GPIO5", "GPIOA", "GPIOB", "GPIOC",
            "GPIOD", "GPIOE", "GPIOF", "GPIOG", "GPIOH",
        ];
        NAMES[self.0 as usize]
    }
}

/// Uniform contract for a set of digital lines.
///
/// Implemented by [`BridgeGpio`] for the bridge's own lines and by
/// [`crate::Pca9538`] for expander lines. [`crate::GpioController`] adds
/// line state and change notification on top.
pub trait LineDriver: Send + Sync + 'static {
    /// Number of addressable lines (numbered from 0).
    fn line_count(&self) -> u8;
    /// Prepares the line for GPIO use.
    fn open_line(&self, line: u8) -> Result<()>;
    /// Returns the line to its default function. Idempotent.
    fn close_line(&self, line: u8) -> Result<()>;
    fn set_direction(&self, line: u8, direction: GpioDirection) -> Result<()>;
    fn direction(&self, line: u8) -> Result<GpioDirection>;
    fn read(&self, line: u8) -> Result<GpioLevel>;
    fn write(&self, line: u8, level: GpioLevel) -> Result<()>;

    /// Reads several lines for one poll cycle.
    fn read_lines(&self, lines: &[u8]) -> Result<Vec<GpioLevel>> {
        lines.iter().map(|&line| self.read(line)).collect()
    }
}

impl Ft260 {
    // --- Bridge GPIO ---

    /// Switches a line to GPIO unless it already is.
    ///
    /// The switch is issued once per function group; lines sharing a group
    /// (e.g. the UART block) do not repeat it.
    pub fn gpio_claim(&self, pin: BridgePin) -> Result<()> {
        let mut claimed = self.claimed_lines();
        if *claimed & pin.mask() != 0 {
            trace!("Line {} ({}) already configured as GPIO", pin.number(), pin.name());
            return Ok(());
        }
        let group = pin.function_group();
        if *claimed & group.mask() == 0 {
            debug!(
                "Switching {:?} function group to GPIO for line {} ({})",
                group,
                pin.number(),
                pin.name()
            );
            self.with_transport(|t| group.claim(t))?;
        }
        *claimed |= pin.mask();
        Ok(())
    }

    /// Releases a line; the group's default function is restored once no
    /// line of the group remains claimed.
    pub fn gpio_release(&self, pin: BridgePin) -> Result<()> {
        let mut claimed = self.claimed_lines();
        if *claimed & pin.mask() == 0 {
            return Ok(());
        }
        *claimed &= !pin.mask();
        let group = pin.function_group();
        if *claimed & group.mask() == 0 {
            debug!(
                "Restoring default function of {:?} group (line {} released)",
                group,
                pin.number()
            );
            self.with_transport(|t| group.release(t))?;
        }
        Ok(())
    }

    /// Checks if a line is currently configured as GPIO by this handle.
    pub fn gpio_is_claimed(&self, pin: BridgePin) -> bool {
        *self.claimed_lines() & pin.mask() != 0
    }

    /// Sets the direction (Input or Output) for a single bridge line.
    pub fn gpio_set_direction(&self, pin: BridgePin, direction: GpioDirection) -> Result<()> {
        self.gpio_claim(pin)?;
        debug!("Setting line {} direction: {:?}", pin.number(), direction);
        self.with_transport(|t| t.gpio_set_dir(pin, direction))
    }

    /// Gets the configured direction of a single bridge line.
    pub fn gpio_get_direction(&self, pin: BridgePin) -> Result<GpioDirection> {
        self.gpio_claim(pin)?;
        self.with_transport(|t| t.gpio_get_dir(pin))
    }

    /// Reads the current level (High or Low) of a single bridge line.
    pub fn gpio_read(&self, pin: BridgePin) -> Result<GpioLevel> {
        self.gpio_claim(pin)?;
        let level = self.with_transport(|t| t.gpio_read(pin))?;
        trace!("Read line {}: {:?}", pin.number(), level);
        Ok(level)
    }

    /// Sets the output level of a single bridge line.
    pub fn gpio_write(&self, pin: BridgePin, level: GpioLevel) -> Result<()> {
        self.gpio_claim(pin)?;
        trace!("Writing line {}: {:?}", pin.number(), level);
        self.with_transport(|t| t.gpio_write(pin, level))
    }
}

/// The bridge's own 14 lines as a [`LineDriver`].
#[derive(Debug, Clone)]
pub struct BridgeGpio {
    bridge: Arc<Ft260>,
}

impl BridgeGpio {
    pub fn new(bridge: Arc<Ft260>) -> Self {
        BridgeGpio { bridge }
    }

    pub fn bridge(&self) -> &Arc<Ft260> {
        &self.bridge
    }
}

impl LineDriver for BridgeGpio {
    fn line_count(&self) -> u8 {
        consts::gpio::BRIDGE_LINE_COUNT
    }

    fn open_line(&self, line: u8) -> Result<()> {
        self.bridge.gpio_claim(BridgePin::new(line)?)
    }

    fn close_line(&self, line: u8) -> Result<()> {
        self.bridge.gpio_release(BridgePin::new(line)?)
    }

    fn set_direction(&self, line: u8, direction: GpioDirection) -> Result<()> {
        self.bridge.gpio_set_direction(BridgePin::new(line)?, direction)
    }

    fn direction(&self, line: u8) -> Result<GpioDirection> {
        self.bridge.gpio_get_direction(BridgePin::new(line)?)
    }

    fn read(&self, line: u8) -> Result<GpioLevel> {
        self.bridge.gpio_read(BridgePin::new(line)?)
    }

    fn write(&self, line: u8, level: GpioLevel) -> Result<()> {
        self.bridge.gpio_write(BridgePin::new(line)?, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_pin_range() {
        assert!(BridgePin::new(0).is_ok());
        assert!(BridgePin::new(13).is_ok());
        assert!(matches!(
            BridgePin::new(14),
            Err(Error::PinArgumentOutOfRange { pin: 14, .. })
        ));
    }

    #[test]
    fn test_function_groups() {
        let group = |n| BridgePin::new(n).unwrap().function_group();
        assert_eq!(group(0), FunctionGroup::I2c);
        assert_eq!(group(1), FunctionGroup::I2c);
        assert_eq!(group(2), FunctionGroup::Gpio2);
        assert_eq!(group(3), FunctionGroup::Wakeup);
        assert_eq!(group(5), FunctionGroup::DcdRi);
        assert_eq!(group(6), FunctionGroup::GpioA);
        assert_eq!(group(12), FunctionGroup::GpioG);
        for n in [7, 8, 9, 10, 11, 13] {
            assert_eq!(group(n), FunctionGroup::Uart, "line {}", n);
        }
    }

    #[test]
    fn test_group_masks_cover_every_line_once() {
        let groups = [
            FunctionGroup::I2c,
            FunctionGroup::Gpio2,
            FunctionGroup::Wakeup,
            FunctionGroup::DcdRi,
            FunctionGroup::GpioA,
            FunctionGroup::Uart,
            FunctionGroup::GpioG,
        ];
        let mut seen = 0u16;
        for g in groups {
            assert_eq!(seen & g.mask(), 0, "{:?} overlaps", g);
            seen |= g.mask();
        }
        assert_eq!(seen, 0x3FFF);
        for n in 0..14 {
            let pin = BridgePin::new(n).unwrap();
            assert_ne!(pin.function_group().mask() & pin.mask(), 0);
        }
    }

    #[test]
    fn test_report_bits() {
        assert_eq!(BridgePin::new(5).unwrap().report_bit(), 5);
        assert_eq!(BridgePin::new(6).unwrap().report_bit(), 0);
        assert_eq!(BridgePin::new(13).unwrap().report_bit(), 7);
        assert_eq!(BridgePin::new(6).unwrap().name(), "GPIOA");
    }

    #[test]
    fn test_mode_directions() {
        assert_eq!(PinMode::Input.direction(), Some(GpioDirection::Input));
        assert_eq!(PinMode::Output.direction(), Some(GpioDirection::Output));
        assert_eq!(PinMode::InputPullUp.direction(), None);
        assert_eq!(PinMode::OutputOpenDrain.direction(), None);
        assert_eq!(PinEdge::towards(GpioLevel::High), PinEdge::Rising);
        assert_eq!(PinEdge::towards(GpioLevel::Low), PinEdge::Falling);
    }
}
