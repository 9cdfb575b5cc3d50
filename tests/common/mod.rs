//! Recording fake transport shared by the integration tests.
#![allow(dead_code)]

use ft260_hid::gpio::{Gpio2Function, GpioAFunction, GpioGFunction};
use ft260_hid::{
    BridgePin, Error, Ft260, GpioDirection, GpioLevel, I2cConfig, I2cFlag, Result, SystemClock,
    Transport,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const STATUS_IDLE: u8 = 0x20;
pub const STATUS_HELD: u8 = 0x60;
pub const STATUS_ADDRESS_NACK: u8 = 0x26;
pub const STATUS_DATA_NACK: u8 = 0x2A;
pub const STATUS_ARBITRATION_LOST: u8 = 0x32;

/// One transport primitive as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ChipVersion,
    SetClock(SystemClock),
    Init(u32),
    Status,
    Reset,
    Read { address: u8, flag: I2cFlag, len: usize },
    Write { address: u8, flag: I2cFlag, data: Vec<u8> },
    EnableI2cPins(bool),
    Gpio2(Gpio2Function),
    GpioA(GpioAFunction),
    GpioG(GpioGFunction),
    Wakeup(bool),
    DcdRi(bool),
    UartPinsGpio(bool),
    SetDir(u8, GpioDirection),
    GetDir(u8),
    GpioRead(u8),
    GpioWrite(u8, GpioLevel),
}

impl Call {
    pub fn is_status(&self) -> bool {
        matches!(self, Call::Status)
    }

    pub fn is_i2c_transfer(&self) -> bool {
        matches!(self, Call::Read { .. } | Call::Write { .. })
    }
}

/// A simulated slave.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub registers: [u8; 256],
    pub pointer: u8,
    /// Reads return the last written bytes instead of register contents.
    pub loopback: bool,
    pub last_write: Vec<u8>,
    pub ack_data_writes: bool,
    pub ack_reads: bool,
}

impl SimDevice {
    /// Register-pointer device: the first written byte selects the register.
    pub fn registers() -> Self {
        SimDevice {
            registers: [0; 256],
            pointer: 0,
            loopback: false,
            last_write: Vec::new(),
            ack_data_writes: true,
            ack_reads: true,
        }
    }

    pub fn loopback() -> Self {
        SimDevice {
            loopback: true,
            ..Self::registers()
        }
    }

    /// Acknowledges reads but NACKs data writes.
    pub fn read_only() -> Self {
        SimDevice {
            ack_data_writes: false,
            ..Self::registers()
        }
    }

    /// Acknowledges only address-only frames.
    pub fn address_only() -> Self {
        SimDevice {
            ack_data_writes: false,
            ack_reads: false,
            ..Self::registers()
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub calls: Vec<Call>,
    pub status: u8,
    /// Returned by the next status reads before `status`.
    pub queued_status: VecDeque<u8>,
    pub devices: BTreeMap<u8, SimDevice>,
    /// Transport-level failure of every I2C transfer.
    pub fail_transfers: bool,
    pub fail_gpio_reads: bool,
    pub fail_set_dir: bool,
    /// Caps the byte count reported by writes.
    pub write_limit: Option<usize>,
    pub gpio_values: u16,
    pub gpio_dirs: u16,
}

pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn transport_error() -> Error {
    Error::Io(std::io::Error::other("simulated HID failure"))
}

impl Transport for FakeTransport {
    fn chip_version(&mut self) -> Result<u32> {
        self.state().calls.push(Call::ChipVersion);
        Ok(0x0260_0200)
    }

    fn set_clock(&mut self, clock: SystemClock) -> Result<()> {
        self.state().calls.push(Call::SetClock(clock));
        Ok(())
    }

    fn i2c_master_init(&mut self, clock_kbps: u32) -> Result<()> {
        let mut s = self.state();
        s.calls.push(Call::Init(clock_kbps));
        s.status = STATUS_IDLE;
        Ok(())
    }

    fn i2c_master_read(
        &mut self,
        address: u8,
        flag: I2cFlag,
        buffer: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<usize> {
        let mut s = self.state();
        s.calls.push(Call::Read {
            address,
            flag,
            len: buffer.len(),
        });
        if s.fail_transfers {
            return Err(transport_error());
        }
        let released = if flag.releases_bus() {
            STATUS_IDLE
        } else {
            STATUS_HELD
        };
        let Some(dev) = s.devices.get_mut(&address).filter(|d| d.ack_reads) else {
            s.status = STATUS_ADDRESS_NACK;
            return Ok(0);
        };
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = if dev.loopback {
                dev.last_write.get(i).copied().unwrap_or(0)
            } else {
                dev.registers[dev.pointer.wrapping_add(i as u8) as usize]
            };
        }
        s.status = released;
        Ok(buffer.len())
    }

    fn i2c_master_write(&mut self, address: u8, flag: I2cFlag, data: &[u8]) -> Result<usize> {
        let mut s = self.state();
        s.calls.push(Call::Write {
            address,
            flag,
            data: data.to_vec(),
        });
        if s.fail_transfers {
            return Err(transport_error());
        }
        let written = s.write_limit.map_or(data.len(), |limit| data.len().min(limit));
        let released = if flag.releases_bus() {
            STATUS_IDLE
        } else {
            STATUS_HELD
        };
        let Some(dev) = s.devices.get_mut(&address) else {
            s.status = STATUS_ADDRESS_NACK;
            return Ok(written);
        };
        if data.is_empty() {
            s.status = released;
            return Ok(0);
        }
        if !dev.ack_data_writes {
            s.status = STATUS_DATA_NACK;
            return Ok(written);
        }
        if dev.loopback {
            dev.last_write = data.to_vec();
        } else {
            dev.pointer = data[0];
            for (i, &byte) in data[1..].iter().enumerate() {
                dev.registers[data[0].wrapping_add(i as u8) as usize] = byte;
            }
        }
        s.status = released;
        Ok(written)
    }

    fn i2c_master_status(&mut self) -> Result<u8> {
        let mut s = self.state();
        s.calls.push(Call::Status);
        let status = s.queued_status.pop_front().unwrap_or(s.status);
        Ok(status)
    }

    fn i2c_master_reset(&mut self) -> Result<()> {
        let mut s = self.state();
        s.calls.push(Call::Reset);
        s.status = STATUS_IDLE;
        Ok(())
    }

    fn enable_i2c_pins(&mut self, enable: bool) -> Result<()> {
        self.state().calls.push(Call::EnableI2cPins(enable));
        Ok(())
    }

    fn select_gpio2_function(&mut self, function: Gpio2Function) -> Result<()> {
        self.state().calls.push(Call::Gpio2(function));
        Ok(())
    }

    fn select_gpioa_function(&mut self, function: GpioAFunction) -> Result<()> {
        self.state().calls.push(Call::GpioA(function));
        Ok(())
    }

    fn select_gpiog_function(&mut self, function: GpioGFunction) -> Result<()> {
        self.state().calls.push(Call::GpioG(function));
        Ok(())
    }

    fn enable_wakeup_interrupt(&mut self, enable: bool) -> Result<()> {
        self.state().calls.push(Call::Wakeup(enable));
        Ok(())
    }

    fn enable_dcd_ri(&mut self, enable: bool) -> Result<()> {
        self.state().calls.push(Call::DcdRi(enable));
        Ok(())
    }

    fn set_uart_pins_gpio(&mut self, to_gpio: bool) -> Result<()> {
        self.state().calls.push(Call::UartPinsGpio(to_gpio));
        Ok(())
    }

    fn gpio_set_dir(&mut self, pin: BridgePin, direction: GpioDirection) -> Result<()> {
        let mut s = self.state();
        s.calls.push(Call::SetDir(pin.number(), direction));
        if s.fail_set_dir {
            return Err(transport_error());
        }
        match direction {
            GpioDirection::Output => s.gpio_dirs |= pin.mask(),
            GpioDirection::Input => s.gpio_dirs &= !pin.mask(),
        }
        Ok(())
    }

    fn gpio_get_dir(&mut self, pin: BridgePin) -> Result<GpioDirection> {
        let mut s = self.state();
        s.calls.push(Call::GetDir(pin.number()));
        Ok(if s.gpio_dirs & pin.mask() != 0 {
            GpioDirection::Output
        } else {
            GpioDirection::Input
        })
    }

    fn gpio_read(&mut self, pin: BridgePin) -> Result<GpioLevel> {
        let mut s = self.state();
        s.calls.push(Call::GpioRead(pin.number()));
        if s.fail_gpio_reads {
            return Err(transport_error());
        }
        Ok(GpioLevel::from(s.gpio_values & pin.mask() != 0))
    }

    fn gpio_write(&mut self, pin: BridgePin, level: GpioLevel) -> Result<()> {
        let mut s = self.state();
        s.calls.push(Call::GpioWrite(pin.number(), level));
        if level.is_high() {
            s.gpio_values |= pin.mask();
        } else {
            s.gpio_values &= !pin.mask();
        }
        Ok(())
    }
}

/// Test-side handle on the fake's state.
#[derive(Clone)]
pub struct Fake {
    state: Arc<Mutex<FakeState>>,
}

impl Fake {
    pub fn new() -> Self {
        Fake {
            state: Arc::new(Mutex::new(FakeState {
                status: STATUS_IDLE,
                ..FakeState::default()
            })),
        }
    }

    /// A bridge over this fake with no status waiting.
    pub fn bridge(&self) -> Arc<Ft260> {
        let transport = FakeTransport {
            state: Arc::clone(&self.state),
        };
        Arc::new(Ft260::from_transport(Box::new(transport)).with_config(I2cConfig::fast()))
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_device(&self, address: u8, device: SimDevice) {
        self.state().devices.insert(address, device);
    }

    pub fn set_register(&self, address: u8, register: u8, value: u8) {
        if let Some(dev) = self.state().devices.get_mut(&address) {
            dev.registers[register as usize] = value;
        }
    }

    pub fn register(&self, address: u8, register: u8) -> u8 {
        self.state().devices[&address].registers[register as usize]
    }

    pub fn set_line(&self, line: u8, level: GpioLevel) {
        let mut s = self.state();
        if level.is_high() {
            s.gpio_values |= 1 << line;
        } else {
            s.gpio_values &= !(1 << line);
        }
    }

    pub fn queue_status(&self, status: u8) {
        self.state().queued_status.push_back(status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Calls without the status polls in between.
    pub fn transfer_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| !c.is_status()).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
