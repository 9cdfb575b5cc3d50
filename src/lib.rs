//! # ft260-hid
//!
//! A Rust crate for the I²C master and GPIO functions of the FTDI FT260
//! USB-HID bridge, plus a driver for the PCA9538 I/O expander that commonly
//! sits behind it.
//!
//! This crate uses the `hidapi` crate for cross-platform USB HID communication.
//!
//! ## Features
//!
//! *   Device discovery (`find_all`, `find_first`, `find_devices`).
//! *   Flexible device opening (`open`, `open_first`, `open_by_vid_pid`, `open_by_path`),
//!     or `from_transport` for custom [`Transport`] implementations.
//! *   I²C master:
//!     *   Clock setup (`i2c_master_init`, 100-4000 kbit/s).
//!     *   Framed raw transfers (`i2c_master_read`, `i2c_master_write`) with
//!         decoded [`I2cStatus`] and automatic controller recovery.
//!     *   Per-address channels ([`I2cDevice`]) with byte, buffer and
//!         repeated-start write-read operations.
//!     *   Bus scanning (`i2c_scan`, `i2c_scan_default`, `i2c_scan_with_progress`).
//!     *   An `embedded-hal` 1.0 [`I2cBus`] for third-party device drivers.
//! *   GPIO:
//!     *   The bridge's 14 lines ([`BridgeGpio`]) with lazy pin-function switching.
//!     *   PCA9538 expander lines ([`Pca9538`]).
//!     *   A [`GpioController`] with open/read/write and pin-change
//!         subscriptions, driven by polling or by an expander interrupt line.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ft260_hid::{BridgeGpio, Ft260, GpioController, GpioDirection, GpioLevel, Result};
//! use hidapi::HidApi;
//! use std::sync::Arc;
//! use std::{thread, time::Duration};
//!
//! fn main() -> Result<()> {
//!     let hid_api = HidApi::new()?;
//!     let bridge = Arc::new(Ft260::open_first(&hid_api)?);
//!
//!     // --- I2C ---
//!     bridge.i2c_master_init(100)?;
//!     let found = bridge.i2c_scan_default()?;
//!     println!("Devices: {:02X?}", found);
//!
//!     let sensor = bridge.i2c_device(0x48)?;
//!     let mut temp = [0u8; 2];
//!     sensor.write_read(&[0x00], &mut temp)?;
//!
//!     // --- GPIO (line 2) ---
//!     let gpio = GpioController::new(BridgeGpio::new(Arc::clone(&bridge)));
//!     let led = gpio.open_line(2, GpioDirection::Output)?;
//!     led.write(GpioLevel::High)?;
//!     thread::sleep(Duration::from_millis(200));
//!     led.write(GpioLevel::Low)?;
//!
//!     let button = gpio.open_line(3, GpioDirection::Input)?;
//!     let token = button.subscribe(|event| println!("Line {}: {:?}", event.line, event.edge))?;
//!     thread::sleep(Duration::from_secs(5));
//!     gpio.unsubscribe(token);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! [`Ft260`] is `Send + Sync` and is shared through `Arc`. Each
//! [`I2cDevice`] operation holds the bus for its full duration; sequences of
//! several operations must be serialised by the caller.
//!
//! ## Hardware Setup Notes
//!
//! *   **I²C Pull-up Resistors:** Required externally (e.g., 4.7kΩ to 3.3V).
//! *   **Linux udev Rules:** Grant user permission to the HID device. Create `/etc/udev/rules.d/99-ft260.rules`:
//!     ```udev
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="0403", ATTRS{idProduct}=="6030", MODE="0666", GROUP="plugdev"
//!     ```
//!     Reload: `sudo udevadm control --reload-rules && sudo udevadm trigger`
//! *   **Kernel driver:** Recent Linux kernels ship `hid-ft260`, which binds the
//!     I²C interface; unbind it or use the hidraw node directly.
//!
//! ## License
//!
//! This project is licensed under the WTFPL - see the [LICENSE](LICENSE) file for details.

// Make internal modules private, re-export public types
mod consts;
mod device;
mod error;
pub mod events;
pub mod gpio;
pub mod hal;
pub mod i2c;
mod i2c_device;
pub mod pca9538;
mod scan;
pub mod transport;

pub use device::{find_all, find_devices, find_first, format_chip_version, Ft260, Ft260DeviceInfo, HidTransport};
pub use error::{Error, Result};
pub use events::{
    EdgeFilter, GpioController, GpioLine, PinChangedEvent, PollConfig, SubscriptionToken,
    TriggerMode,
};
pub use gpio::{BridgeGpio, BridgePin, GpioDirection, GpioLevel, LineDriver, PinEdge, PinMode};
pub use hal::I2cBus;
pub use i2c::{I2cAddress, I2cConfig, I2cFlag, I2cStatus, MasterRead, MasterWrite, StatusMode};
pub use i2c_device::I2cDevice;
pub use pca9538::Pca9538;
pub use scan::format_scan_grid;
pub use transport::{SystemClock, Transport};
// Re-export only essential public constants
pub use consts::{FT260_PID, FTDI_VID};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_constants() {
        assert_eq!(FTDI_VID, 0x0403);
        assert_eq!(FT260_PID, 0x6030);
    }

    #[test]
    fn test_error_classification() {
        let address = I2cAddress::new(0x50).unwrap();
        assert!(Error::NotAcknowledged {
            address,
            status: I2cStatus::ADDRESS_NACK
        }
        .is_bus_failure());
        assert!(Error::TransportFailure { address }.is_bus_failure());
        assert!(Error::IncompleteTransfer {
            address,
            expected: 1,
            actual: 0
        }
        .is_bus_failure());
        assert!(!Error::InvalidArgument("x".into()).is_bus_failure());
        assert!(!Error::NotConnected.is_bus_failure());
    }

    #[test]
    fn test_error_messages() {
        let address = I2cAddress::new(0x3C).unwrap();
        let err = Error::IncompleteTransfer {
            address,
            expected: 4,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Incomplete I2C transfer at address 0x3C: expected 4 bytes, got 2"
        );
        let err = Error::UnsupportedMode {
            line: 2,
            mode: PinMode::InputPullUp,
        };
        assert!(err.to_string().contains("InputPullUp"));
    }
}
