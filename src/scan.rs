//! I2C bus scanning.

use crate::consts;
use crate::device::Ft260;
use crate::error::{Error, Result};
use crate::i2c::{I2cAddress, StatusMode};
use crate::i2c_device::I2cDevice;
use log::{info, trace};
use std::fmt::Write;
use std::sync::Arc;

type Probe = fn(&I2cDevice) -> Result<()>;

// Tried in order until one is acknowledged.
const PROBES: [(&str, Probe); 3] = [
    ("write 0x00", |dev| dev.write_byte(0)),
    ("read 1 byte", |dev| dev.read_byte().map(|_| ())),
    ("quick write", |dev| dev.quick_write()),
];

impl Ft260 {
    /// Checks whether a device acknowledges at `address`.
    ///
    /// Probes a zero-byte write, then a one-byte read, then an address-only
    /// write. A NACK or bus failure moves on to the next probe; any other
    /// error counts as "absent".
    pub fn probe_address(self: &Arc<Self>, address: u8) -> Result<bool> {
        let device = I2cDevice::new(Arc::clone(self), I2cAddress::new(address)?)
            .with_status_mode(StatusMode::QuickScan)
            .with_read_timeout(consts::i2c::SCAN_READ_TIMEOUT_MS);
        Ok(probe(&device))
    }

    /// Scans 7-bit addresses `start_addr..=end_addr`.
    /// Returns the responding addresses in ascending order.
    ///
    /// # Example
    /// ```no_run
    /// # use ft260_hid::*;
    /// # use hidapi::HidApi;
    /// # use std::sync::Arc;
    /// # fn main() -> Result<()> {
    /// # let hid_api = HidApi::new()?;
    /// let bridge = Arc::new(Ft260::open_first(&hid_api)?);
    /// bridge.i2c_master_init(100)?;
    /// for addr in bridge.i2c_scan(0x08, 0x77)? {
    ///     println!("Found device at 0x{:02X}", addr);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn i2c_scan(self: &Arc<Self>, start_addr: u8, end_addr: u8) -> Result<Vec<u8>> {
        self.i2c_scan_with_progress(start_addr, end_addr, |_, _, _, _| {})
    }

    /// Scans the conventional range 0x03 to 0x77.
    pub fn i2c_scan_default(self: &Arc<Self>) -> Result<Vec<u8>> {
        self.i2c_scan(consts::i2c::SCAN_FIRST_ADDRESS, consts::i2c::SCAN_LAST_ADDRESS)
    }

    /// Scan with a progress callback invoked for each address tested:
    /// `(addr, found, current_idx, total)`.
    ///
    /// The range is validated before the bus is touched. Per-address probe
    /// failures are never returned; a closed connection is.
    pub fn i2c_scan_with_progress<F>(
        self: &Arc<Self>,
        start_addr: u8,
        end_addr: u8,
        mut progress_callback: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(u8, bool, usize, usize),
    {
        validate_range(start_addr, end_addr)?;
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let mut found_devices = Vec::new();
        let total_addresses = (end_addr - start_addr) as usize + 1;
        for (idx, addr) in (start_addr..=end_addr).enumerate() {
            let found = self.probe_address(addr)?;
            if found {
                found_devices.push(addr);
            }
            progress_callback(addr, found, idx, total_addresses);
        }

        info!(
            "I2C scan 0x{:02X}-0x{:02X}, {} device(s) found:\n{}",
            start_addr,
            end_addr,
            found_devices.len(),
            format_scan_grid(&found_devices, start_addr, end_addr)
        );
        Ok(found_devices)
    }
}

fn validate_range(start_addr: u8, end_addr: u8) -> Result<()> {
    if end_addr > consts::i2c::MAX_7BIT_ADDRESS || start_addr > end_addr {
        return Err(Error::ArgumentOutOfRange(format!(
            "Scan range 0x{:02X}-0x{:02X} invalid; need start <= end <= 0x7F",
            start_addr, end_addr
        )));
    }
    Ok(())
}

fn probe(device: &I2cDevice) -> bool {
    for (name, probe) in PROBES {
        match probe(device) {
            Ok(()) => {
                trace!("{} acknowledged {}", device.address(), name);
                return true;
            }
            Err(e) if e.is_bus_failure() => continue,
            Err(e) => {
                trace!("{}: {} failed: {}", device.address(), name, e);
                return false;
            }
        }
    }
    false
}

/// Renders scan results as a 16-column hex grid in the style of `i2cdetect`.
///
/// Found addresses show their value, probed but silent ones `--`, and
/// addresses outside the scanned range are blank.
pub fn format_scan_grid(found: &[u8], start_addr: u8, end_addr: u8) -> String {
    let mut grid = String::from("    ");
    for col in 0..16 {
        let _ = write!(grid, " {:x} ", col);
    }
    let first_row = start_addr & 0xF0;
    let last_row = end_addr.min(consts::i2c::MAX_7BIT_ADDRESS) & 0xF0;
    for row in (first_row..=last_row).step_by(16) {
        let _ = write!(grid, "\n{:02x}: ", row);
        for col in 0..16u8 {
            let addr = row + col;
            if addr < start_addr || addr > end_addr {
                grid.push_str("   ");
            } else if found.contains(&addr) {
                let _ = write!(grid, "{:02x} ", addr);
            } else {
                grid.push_str("-- ");
            }
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation() {
        assert!(validate_range(0x03, 0x77).is_ok());
        assert!(validate_range(0x00, 0x7F).is_ok());
        assert!(validate_range(0x10, 0x10).is_ok());
        assert!(matches!(
            validate_range(0x20, 0x10),
            Err(Error::ArgumentOutOfRange(_))
        ));
        assert!(matches!(
            validate_range(0x03, 0x80),
            Err(Error::ArgumentOutOfRange(_))
        ));
    }

    #[test]
    fn test_scan_grid_layout() {
        let grid = format_scan_grid(&[0x3C, 0x50], 0x03, 0x77);
        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].starts_with("     0  1  2"));
        assert!(lines[1].starts_with("00:          -- "));
        assert!(lines[4].contains(" 3c "));
        assert!(lines[6].starts_with("50: 50 -- "));
        // 0x78-0x7F are outside the range.
        assert!(lines[8].starts_with("70: -- -- -- -- -- -- -- --    "));
    }

    #[test]
    fn test_scan_grid_single_row() {
        let grid = format_scan_grid(&[], 0x20, 0x21);
        assert_eq!(grid.lines().count(), 2);
        assert!(grid.lines().nth(1).unwrap().starts_with("20: -- --    "));
    }
}
