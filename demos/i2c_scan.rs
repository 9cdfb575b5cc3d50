use hidapi::HidApi;
use std::sync::Arc;
use ft260_hid::{self, Ft260, Result};

fn main() -> Result<()> {
    env_logger::init();
    let hid_api = HidApi::new()?;
    println!("Opening first FT260 device...");
    let device = match Ft260::open_first(&hid_api) {
        Ok(dev) => Arc::new(dev),
        Err(e) => {
            eprintln!("Error opening device: {}", e);
            eprintln!(
                "Ensure device is connected and permissions are set (e.g., udev rules on Linux)."
            );
            return Err(e);
        }
    };
    println!("Device opened.");

    println!("Initializing I2C master at 100kHz...");
    device.i2c_master_init(100)?;

    println!("Scanning I2C bus (7-bit addresses 0x03 to 0x77)...");
    let found_devices = device.i2c_scan_default()?;

    println!("{}", ft260_hid::format_scan_grid(&found_devices, 0x03, 0x77));

    if found_devices.is_empty() {
        println!("No I2C devices found.");
    } else {
        println!(
            "Scan complete. Found 7-bit addresses: {:?}",
            found_devices
                .iter()
                .map(|a| format!("0x{:02X}", a))
                .collect::<Vec<_>>()
        );
    }

    Ok(())
}
