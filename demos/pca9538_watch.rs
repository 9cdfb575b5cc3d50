use hidapi::HidApi;
use std::{env, sync::Arc, thread, time::Duration};
use ft260_hid::{
    BridgeGpio, Ft260, GpioController, GpioDirection, Pca9538, PollConfig, Result,
};

// Bridge line wired to the expander's INT output (GPIO3 / DIO9).
const INT_LINE: u8 = 3;

fn main() -> Result<()> {
    env_logger::init();
    let use_interrupt = env::args().any(|a| a == "--interrupt");

    let hid_api = HidApi::new()?;
    println!("Opening first FT260 device...");
    let device = Arc::new(Ft260::open_first(&hid_api)?);
    device.i2c_master_init(100)?;

    let expander = Pca9538::with_default_address(&device)?;
    println!(
        "PCA9538 at {}: configuration 0x{:02X}",
        expander.device().address(),
        expander.configuration()?
    );

    let host = GpioController::new(BridgeGpio::new(Arc::clone(&device)));
    let gpio = GpioController::with_config(
        expander,
        PollConfig::with_interval(Duration::from_millis(20)),
    );

    for line in 0..gpio.line_count() {
        gpio.open_line(line, GpioDirection::Input)?;
        gpio.subscribe(line, |event| {
            println!("Expander line {} -> {:?}", event.line, event.level());
        })?;
    }

    if use_interrupt {
        gpio.attach_interrupt(&host, INT_LINE)?;
        println!("Watching expander lines via INT on bridge line {}", INT_LINE);
    } else {
        println!("Polling expander lines every 20ms");
    }
    println!("Press Ctrl+C to stop");

    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
