use hidapi::HidApi;
use std::{sync::Arc, thread, time::Duration};
use ft260_hid::{BridgeGpio, Ft260, GpioController, GpioDirection, GpioLevel, Result};

// GPIO2, free unless configured as SUSPOUT.
const BLINK_LINE: u8 = 2;

fn main() -> Result<()> {
    env_logger::init();
    let hid_api = HidApi::new()?;
    println!("Opening first FT260 device...");
    let device = Arc::new(Ft260::open_first(&hid_api)?);
    println!("Device opened.");

    let gpio = GpioController::new(BridgeGpio::new(device));
    let line = gpio.open_line(BLINK_LINE, GpioDirection::Output)?;

    println!("Blinking line {} (Press Ctrl+C to stop)", line.number());
    loop {
        line.write(GpioLevel::High)?;
        thread::sleep(Duration::from_millis(250));
        line.write(GpioLevel::Low)?;
        thread::sleep(Duration::from_millis(250));
    }
}
