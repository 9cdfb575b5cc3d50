// tests/hardware_tests.rs
use hidapi::HidApi;
use std::sync::Arc;
use std::{thread, time::Duration};
use ft260_hid::{
    self, BridgeGpio, BridgePin, Ft260, GpioController, GpioDirection, GpioLevel, LineDriver,
    Pca9538, Result,
};

// Address of a device KNOWN TO BE on your bus.
const KNOWN_GOOD_ADDR: u8 = 0x70;
// Address KNOWN TO BE EMPTY.
const KNOWN_BAD_ADDR: u8 = 0x31;

// Helper to open the first device, panics on failure for test simplicity
fn open_test_device() -> Arc<Ft260> {
    let _ = env_logger::builder().is_test(true).try_init();
    let hid_api = HidApi::new().expect("Failed to create HID API");
    let device = Ft260::open_first(&hid_api)
        .expect("Failed to open any FT260 device. Is it connected and permissions set?");
    device.i2c_master_init(100).expect("I2C master init failed");
    Arc::new(device)
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_chip_version() -> Result<()> {
    let device = open_test_device();
    let code = device.chip_version()?;
    println!("Chip version {}", ft260_hid::format_chip_version(code));
    assert_eq!(code >> 16, 0x0260, "Unexpected chip code");
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_gpio_output_readback() -> Result<()> {
    let device = open_test_device();
    let pin = BridgePin::new(2)?;

    println!("Testing GPIO Output Readback on {}", pin.name());
    device.gpio_claim(pin)?;
    device.gpio_set_direction(pin, GpioDirection::Output)?;

    device.gpio_write(pin, GpioLevel::High)?;
    thread::sleep(Duration::from_millis(5)); // Allow state to settle
    assert_eq!(device.gpio_read(pin)?, GpioLevel::High, "Pin should read HIGH");

    device.gpio_write(pin, GpioLevel::Low)?;
    thread::sleep(Duration::from_millis(5));
    assert_eq!(device.gpio_read(pin)?, GpioLevel::Low, "Pin should read LOW");

    // Cleanup: Set back to input and restore the pin function
    device.gpio_set_direction(pin, GpioDirection::Input)?;
    device.gpio_release(pin)?;
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_i2c_presence_check() -> Result<()> {
    let device = open_test_device();

    println!("Testing I2C Presence Check");
    assert!(
        device.probe_address(KNOWN_GOOD_ADDR)?,
        "Expected ACK from 0x{:02X}",
        KNOWN_GOOD_ADDR
    );
    assert!(
        !device.probe_address(KNOWN_BAD_ADDR)?,
        "Expected NACK from 0x{:02X}",
        KNOWN_BAD_ADDR
    );
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_i2c_scan() -> Result<()> {
    let device = open_test_device();
    let found = device.i2c_scan_default()?;
    println!("{}", ft260_hid::format_scan_grid(&found, 0x03, 0x77));
    assert!(found.contains(&KNOWN_GOOD_ADDR));
    assert!(!found.contains(&KNOWN_BAD_ADDR));
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires a PCA9538 at 0x70
fn test_pca9538_output_latch() -> Result<()> {
    let device = open_test_device();
    let pca = Pca9538::with_default_address(&device)?;
    let saved_config = pca.configuration()?;

    pca.set_direction(0, GpioDirection::Output)?;
    pca.write(0, GpioLevel::High)?;
    assert_eq!(pca.output_port()? & 0x01, 0x01);
    pca.write(0, GpioLevel::Low)?;
    assert_eq!(pca.output_port()? & 0x01, 0x00);

    pca.set_configuration(saved_config)?;
    Ok(())
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_poll_worker_starts_and_stops() -> Result<()> {
    let device = open_test_device();
    let gpio = GpioController::new(BridgeGpio::new(device));
    gpio.open_line(2, GpioDirection::Input)?;

    let token = gpio.subscribe(2, |event| println!("Line 2 -> {:?}", event.level()))?;
    assert!(gpio.is_polling());
    thread::sleep(Duration::from_millis(200));
    assert!(gpio.unsubscribe(token));
    assert!(!gpio.is_polling());

    gpio.close_line(2)?;
    Ok(())
}
