//! Device discovery, connection lifecycle and the HID transport for FT260 bridges.

use crate::consts;
use crate::error::{Error, Result};
use crate::gpio::{
    BridgePin, Gpio2Function, GpioAFunction, GpioDirection, GpioGFunction, GpioLevel,
};
use crate::i2c::{I2cConfig, I2cFlag};
use crate::transport::{SystemClock, Transport};
use hidapi::{HidApi, HidDevice};
use log::{debug, info, trace, warn};
use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Information about a discovered FT260 I2C interface.
/// Can be used with `Ft260::open` to connect to a specific device.
#[derive(Debug, Clone)]
pub struct Ft260DeviceInfo {
    pub vid: u16,
    pub pid: u16,
    /// The unique, platform-specific path to the HID interface. Use this for reliable opening.
    pub path: CString,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
    pub interface_number: i32,
}

/// Finds all connected FT260 I2C interfaces with the default FTDI VID/PID.
pub fn find_all(hid_api: &HidApi) -> Result<Vec<Ft260DeviceInfo>> {
    find_devices(hid_api, consts::FTDI_VID, consts::FT260_PID)
}

/// Finds the first connected FT260 I2C interface.
///
/// **Warning:** If multiple bridges are connected, which one is "first" is
/// determined by the OS and `hidapi`. Use `find_all` for reliable selection.
pub fn find_first(hid_api: &HidApi) -> Result<Ft260DeviceInfo> {
    find_all(hid_api)?
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound)
}

/// Finds I2C interfaces (interface 0) of devices matching `vid`/`pid`.
///
/// Platforms that do not report interface numbers (`-1`) are accepted as well.
pub fn find_devices(hid_api: &HidApi, vid: u16, pid: u16) -> Result<Vec<Ft260DeviceInfo>> {
    let devices = hid_api
        .device_list()
        .filter(|info| info.vendor_id() == vid && info.product_id() == pid)
        .filter(|info| {
            info.interface_number() == consts::FT260_I2C_INTERFACE || info.interface_number() < 0
        })
        .map(|info| {
            debug!(
                "Found FT260 interface: VID={:04X}, PID={:04X}, Path={:?}, Interface={}, SN={:?}",
                info.vendor_id(),
                info.product_id(),
                info.path(),
                info.interface_number(),
                info.serial_number()
            );
            Ft260DeviceInfo {
                vid: info.vendor_id(),
                pid: info.product_id(),
                path: info.path().to_owned(),
                serial_number: info.serial_number().map(String::from),
                product_string: info.product_string().map(String::from),
                interface_number: info.interface_number(),
            }
        })
        .collect();
    Ok(devices)
}

/// Formats a chip code as dotted bytes, most significant first.
pub fn format_chip_version(code: u32) -> String {
    let [a, b, c, d] = code.to_be_bytes();
    format!("{}.{}.{}.{}", a, b, c, d)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection to an FT260 bridge.
///
/// The handle is caller-owned and meant to be shared through `Arc`: I2C
/// channels, the bus scanner and GPIO drivers all hold a reference to it.
/// After [`Ft260::close`] every operation fails with [`Error::NotConnected`].
///
/// Each transport primitive is serialised internally, and every
/// [`crate::I2cDevice`] operation holds the bus for its whole duration.
/// Sequences spanning several operations must be serialised by the caller.
pub struct Ft260 {
    transport: Mutex<Option<Box<dyn Transport>>>,
    bus: Mutex<()>,
    claimed: Mutex<u16>,
    config: I2cConfig,
    info: Option<Ft260DeviceInfo>,
}

impl fmt::Debug for Ft260 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ft260")
            .field("connected", &self.is_connected())
            .field("config", &self.config)
            .field("info", &self.info)
            .finish()
    }
}

impl Ft260 {
    // --- Constructors and Info ---

    /// Opens a device using its discovery info. Recommended method.
    pub fn open(hid_api: &HidApi, info: &Ft260DeviceInfo) -> Result<Self> {
        let device = hid_api
            .open_path(&info.path)
            .map_err(|e| Error::DeviceOpenFail {
                path: format!("{:?}", info.path),
                message: format!("{}", e),
            })?;
        debug!(
            "Opened FT260 device: VID={:04X}, PID={:04X}, Path={:?}",
            info.vid, info.pid, info.path
        );
        let bridge = Self {
            info: Some(info.clone()),
            ..Self::from_transport(Box::new(HidTransport::new(device)))
        };
        bridge.log_chip_version();
        Ok(bridge)
    }

    /// Opens the first discovered FT260. **Warning:** Ambiguous if multiple devices exist.
    pub fn open_first(hid_api: &HidApi) -> Result<Self> {
        let info = find_first(hid_api)?;
        Self::open(hid_api, &info)
    }

    /// Opens the I2C interface of the first device matching `vid`/`pid`.
    pub fn open_by_vid_pid(hid_api: &HidApi, vid: u16, pid: u16) -> Result<Self> {
        let info = find_devices(hid_api, vid, pid)?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound)?;
        Self::open(hid_api, &info)
    }

    /// Opens a device by its platform-specific path.
    pub fn open_by_path(hid_api: &HidApi, path: &CStr) -> Result<Self> {
        let device = hid_api
            .open_path(path)
            .map_err(|e| Error::DeviceOpenFail {
                path: format!("{:?}", path),
                message: format!("{}", e),
            })?;
        let hid_info = device.get_device_info()?;
        let info = Ft260DeviceInfo {
            vid: hid_info.vendor_id(),
            pid: hid_info.product_id(),
            path: path.to_owned(),
            serial_number: hid_info.serial_number().map(String::from),
            product_string: hid_info.product_string().map(String::from),
            interface_number: hid_info.interface_number(),
        };
        let bridge = Self {
            info: Some(info),
            ..Self::from_transport(Box::new(HidTransport::new(device)))
        };
        bridge.log_chip_version();
        Ok(bridge)
    }

    /// Wraps an already opened transport. This is the core constructor the
    /// others use internally, and the entry point for custom transports.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            bus: Mutex::new(()),
            claimed: Mutex::new(0),
            config: I2cConfig::default(),
            info: None,
        }
    }

    /// Replaces the I2C status polling configuration.
    pub fn with_config(mut self, config: I2cConfig) -> Self {
        self.config = config;
        self
    }

    /// The active I2C configuration.
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Discovery info, if the device was opened through `hidapi`.
    pub fn device_info(&self) -> Option<&Ft260DeviceInfo> {
        self.info.as_ref()
    }

    /// Closes the connection. Later operations fail with `NotConnected`.
    pub fn close(&self) {
        if lock(&self.transport).take().is_some() {
            debug!("FT260 connection closed");
        }
        *lock(&self.claimed) = 0;
    }

    /// `true` until [`Ft260::close`] is called.
    pub fn is_connected(&self) -> bool {
        lock(&self.transport).is_some()
    }

    /// Chip code reported by the device.
    pub fn chip_version(&self) -> Result<u32> {
        self.with_transport(|t| t.chip_version())
    }

    /// Sets the system clock rate. The power-on default is 48 MHz.
    pub fn set_clock(&self, clock: SystemClock) -> Result<()> {
        debug!("Setting system clock: {:?}", clock);
        self.with_transport(|t| t.set_clock(clock))
    }

    fn log_chip_version(&self) {
        match self.chip_version() {
            Ok(code) => info!("FT260 chip version {}", format_chip_version(code)),
            Err(e) => warn!("Could not read FT260 chip version: {}", e),
        }
    }

    // Runs one transport primitive under the transport lock.
    pub(crate) fn with_transport<R>(
        &self,
        f: impl FnOnce(&mut dyn Transport) -> Result<R>,
    ) -> Result<R> {
        let mut guard = lock(&self.transport);
        let transport = guard.as_mut().ok_or(Error::NotConnected)?;
        f(transport.as_mut())
    }

    // Held by a channel for the duration of one device-level operation.
    pub(crate) fn lock_bus(&self) -> MutexGuard<'_, ()> {
        lock(&self.bus)
    }

    pub(crate) fn claimed_lines(&self) -> MutexGuard<'_, u16> {
        lock(&self.claimed)
    }
}

// --- HID transport ---

// Snapshot of the 0xB0 GPIO feature report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GpioReport {
    value: u8,
    dir: u8,
    ext_value: u8,
    ext_dir: u8,
}

impl GpioReport {
    fn from_bytes(buf: &[u8]) -> Self {
        GpioReport {
            value: buf[1],
            dir: buf[2],
            ext_value: buf[3],
            ext_dir: buf[4],
        }
    }

    fn to_bytes(self) -> [u8; consts::GPIO_REPORT_SIZE] {
        [
            consts::REPORT_ID_GPIO,
            self.value,
            self.dir,
            self.ext_value,
            self.ext_dir,
        ]
    }

    fn value_byte(&mut self, pin: BridgePin) -> &mut u8 {
        if pin.in_low_group() {
            &mut self.value
        } else {
            &mut self.ext_value
        }
    }

    fn dir_byte(&mut self, pin: BridgePin) -> &mut u8 {
        if pin.in_low_group() {
            &mut self.dir
        } else {
            &mut self.ext_dir
        }
    }
}

fn set_bit(byte: &mut u8, bit: u8, on: bool) {
    if on {
        *byte |= 1 << bit;
    } else {
        *byte &= !(1 << bit);
    }
}

/// Report ID of the data report that carries `len` payload bytes.
pub(crate) fn data_report_id(len: usize) -> u8 {
    consts::i2c::REPORT_ID_DATA_FIRST + (len.saturating_sub(1) / 4) as u8
}

/// Builds one I2C write report: `[id, address, flag, len, data...]`.
pub(crate) fn encode_write_report(address: u8, flag: u8, chunk: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(consts::i2c::OUT_REPORT_HEADER_SIZE + chunk.len());
    buf.push(data_report_id(chunk.len()));
    buf.push(address);
    buf.push(flag);
    buf.push(chunk.len() as u8);
    buf.extend_from_slice(chunk);
    buf
}

/// Condition byte for chunk `index` of `count` when a transfer spans several reports.
pub(crate) fn chunk_flag(flag: I2cFlag, index: usize, count: usize) -> u8 {
    let bits = flag.bits();
    let mut out = consts::i2c::flag_bits::NONE;
    if index == 0 {
        out |= bits & consts::i2c::flag_bits::START_MASK;
    }
    if index + 1 == count {
        out |= bits & consts::i2c::flag_bits::STOP;
    }
    out
}

/// Rejects a feature reply that is shorter than `min_len` or carries another report ID.
pub(crate) fn check_feature_report(
    report_id: u8,
    buf: &[u8],
    len: usize,
    min_len: usize,
) -> Result<()> {
    if len < min_len || buf.first() != Some(&report_id) {
        warn!(
            "get_feature_report {:02X} returned {} bytes (need {}) with ID {:02X?}",
            report_id,
            len,
            min_len,
            buf.first()
        );
        return Err(Error::InvalidReport(len));
    }
    Ok(())
}

/// Reassembles I2C input reports `[id, len, data...]` into `buffer`.
///
/// `next_report` fills one report and returns its size, 0 on timeout.
/// Reports that are not data reports, or that carry no payload, are skipped
/// up to a fixed limit.
pub(crate) fn read_input_reports<F>(buffer: &mut [u8], mut next_report: F) -> Result<usize>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    let mut received = 0;
    let mut skipped = 0;
    while received < buffer.len() {
        let mut report = [0u8; consts::i2c::IN_REPORT_BUF_SIZE];
        let n = next_report(&mut report)?;
        if n == 0 {
            warn!(
                "I2C read timed out after {} of {} bytes",
                received,
                buffer.len()
            );
            return Err(Error::Timeout);
        }
        if n < consts::i2c::IN_REPORT_HEADER_SIZE {
            return Err(Error::InvalidReport(n));
        }
        trace!("Received {} bytes from device: {:02X?}", n, &report[..n]);
        let id = report[0];
        let start = consts::i2c::IN_REPORT_HEADER_SIZE;
        let chunk = (report[1] as usize)
            .min(n - start)
            .min(buffer.len() - received);
        let is_data =
            (consts::i2c::REPORT_ID_DATA_FIRST..=consts::i2c::REPORT_ID_DATA_LAST).contains(&id);
        if !is_data || chunk == 0 {
            skipped += 1;
            if skipped > consts::i2c::MAX_SKIPPED_REPORTS {
                return Err(Error::InvalidReport(n));
            }
            continue;
        }
        buffer[received..received + chunk].copy_from_slice(&report[start..start + chunk]);
        received += chunk;
    }
    Ok(received)
}

/// [`Transport`] over the FT260 HID report protocol.
#[derive(Debug)]
pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        HidTransport { device }
    }

    fn system_setting(&self, request: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(request.len() + 1);
        buf.push(consts::REPORT_ID_SYSTEM_SETTING);
        buf.extend_from_slice(request);
        trace!("Writing Feature Report (System Setting): {:02X?}", &buf[..]);
        self.device.send_feature_report(&buf)?;
        Ok(())
    }

    fn get_feature(&self, report_id: u8, size: usize, min_len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        buf[0] = report_id;
        let len = self.device.get_feature_report(&mut buf)?;
        trace!(
            "Read Feature Report {:02X}: {:02X?}",
            report_id,
            &buf[..len.min(size)]
        );
        check_feature_report(report_id, &buf, len, min_len)?;
        Ok(buf)
    }

    fn gpio_report(&self) -> Result<GpioReport> {
        let buf = self.get_feature(
            consts::REPORT_ID_GPIO,
            consts::GPIO_REPORT_SIZE,
            consts::GPIO_REPORT_SIZE,
        )?;
        Ok(GpioReport::from_bytes(&buf))
    }

    fn set_gpio_report(&self, report: GpioReport) -> Result<()> {
        let buf = report.to_bytes();
        trace!("Writing Feature Report (GPIO): {:02X?}", &buf[..]);
        self.device.send_feature_report(&buf)?;
        Ok(())
    }

    fn bool_setting(&self, request: u8, enable: bool) -> Result<()> {
        self.system_setting(&[request, enable as u8])
    }
}

impl Transport for HidTransport {
    fn chip_version(&mut self) -> Result<u32> {
        let buf = self.get_feature(
            consts::REPORT_ID_CHIP_VERSION,
            consts::CHIP_VERSION_REPORT_SIZE,
            consts::CHIP_VERSION_MIN_LEN,
        )?;
        Ok(u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]))
    }

    fn set_clock(&mut self, clock: SystemClock) -> Result<()> {
        self.system_setting(&[consts::system::SET_CLOCK, clock.value()])
    }

    fn i2c_master_init(&mut self, clock_kbps: u32) -> Result<()> {
        let [lo, hi] = (clock_kbps as u16).to_le_bytes();
        self.system_setting(&[consts::system::SET_I2C_CLOCK_SPEED, lo, hi])
    }

    fn i2c_master_read(
        &mut self,
        address: u8,
        flag: I2cFlag,
        buffer: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let len = u16::try_from(buffer.len()).map_err(|_| {
            Error::ArgumentOutOfRange(format!("I2C read of {} bytes exceeds 65535", buffer.len()))
        })?;
        let [len_lo, len_hi] = len.to_le_bytes();
        let request = [
            consts::i2c::REPORT_ID_READ_REQUEST,
            address,
            flag.bits(),
            len_lo,
            len_hi,
        ];
        trace!("I2C read request: {:02X?}", &request);
        self.device.write(&request)?;

        let timeout = i32::try_from(timeout_ms).unwrap_or(i32::MAX);
        let device = &self.device;
        read_input_reports(buffer, |report| Ok(device.read_timeout(report, timeout)?))
    }

    fn i2c_master_write(&mut self, address: u8, flag: I2cFlag, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            let report = encode_write_report(address, flag.bits(), &[]);
            trace!("I2C OUT buffer: {:02X?}", &report);
            self.device.write(&report)?;
            return Ok(0);
        }
        let chunks: Vec<&[u8]> = data.chunks(consts::i2c::REPORT_MAX_DATA_SIZE).collect();
        let mut written = 0;
        for (index, chunk) in chunks.iter().enumerate() {
            let report = encode_write_report(address, chunk_flag(flag, index, chunks.len()), chunk);
            trace!("I2C OUT buffer: {:02X?}", &report);
            let sent = self.device.write(&report)?;
            if sent < report.len() {
                warn!("Partial write: sent {} of {} bytes", sent, report.len());
                return Ok(written + sent.saturating_sub(consts::i2c::OUT_REPORT_HEADER_SIZE));
            }
            written += chunk.len();
        }
        Ok(written)
    }

    fn i2c_master_status(&mut self) -> Result<u8> {
        let buf = self.get_feature(
            consts::REPORT_ID_I2C_STATUS,
            consts::I2C_STATUS_REPORT_SIZE,
            consts::I2C_STATUS_MIN_LEN,
        )?;
        Ok(buf[1])
    }

    fn i2c_master_reset(&mut self) -> Result<()> {
        self.system_setting(&[consts::system::I2C_RESET])
    }

    fn enable_i2c_pins(&mut self, enable: bool) -> Result<()> {
        self.bool_setting(consts::system::SET_I2C_MODE, enable)
    }

    fn select_gpio2_function(&mut self, function: Gpio2Function) -> Result<()> {
        self.system_setting(&[consts::system::SELECT_GPIO2_FUNCTION, function.value()])
    }

    fn select_gpioa_function(&mut self, function: GpioAFunction) -> Result<()> {
        self.system_setting(&[consts::system::SELECT_GPIOA_FUNCTION, function.value()])
    }

    fn select_gpiog_function(&mut self, function: GpioGFunction) -> Result<()> {
        self.system_setting(&[consts::system::SELECT_GPIOG_FUNCTION, function.value()])
    }

    fn enable_wakeup_interrupt(&mut self, enable: bool) -> Result<()> {
        self.bool_setting(consts::system::ENABLE_INTERRUPT, enable)
    }

    fn enable_dcd_ri(&mut self, enable: bool) -> Result<()> {
        self.bool_setting(consts::system::ENABLE_UART_DCD_RI, enable)
    }

    fn set_uart_pins_gpio(&mut self, to_gpio: bool) -> Result<()> {
        let mode = if to_gpio {
            consts::system::UART_MODE_OFF
        } else {
            consts::system::UART_MODE_RTS_CTS
        };
        self.system_setting(&[consts::system::SET_UART_MODE, mode])
    }

    fn gpio_set_dir(&mut self, pin: BridgePin, direction: GpioDirection) -> Result<()> {
        let mut report = self.gpio_report()?;
        set_bit(
            report.dir_byte(pin),
            pin.report_bit(),
            direction == GpioDirection::Output,
        );
        self.set_gpio_report(report)
    }

    fn gpio_get_dir(&mut self, pin: BridgePin) -> Result<GpioDirection> {
        let mut report = self.gpio_report()?;
        Ok(if *report.dir_byte(pin) & (1 << pin.report_bit()) != 0 {
            GpioDirection::Output
        } else {
            GpioDirection::Input
        })
    }

    fn gpio_read(&mut self, pin: BridgePin) -> Result<GpioLevel> {
        let mut report = self.gpio_report()?;
        Ok(GpioLevel::from(
            *report.value_byte(pin) & (1 << pin.report_bit()) != 0,
        ))
    }

    fn gpio_write(&mut self, pin: BridgePin, level: GpioLevel) -> Result<()> {
        let mut report = self.gpio_report()?;
        set_bit(report.value_byte(pin), pin.report_bit(), level.is_high());
        self.set_gpio_report(report)
    }
}
