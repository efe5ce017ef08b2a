// src/lib.rs
//
// ethocan: carries Ethernet frames between a TAP interface and a half-duplex
// serial bus.

#[macro_use]
mod logging;

pub mod bridge;
pub mod checksums;
pub mod io;
pub mod settings;

pub use settings::{load_settings, BridgeSettings, Overrides};

/// Acquire the devices named in `settings` and bridge until one of them fails.
pub fn run(settings: BridgeSettings) -> Result<(), String> {
    settings.validate()?;
    logging::set_debug(settings.debug);
    if let Some(dir) = &settings.log_dir {
        logging::init_file_logging(dir)?;
    }

    let result = run_bridge(&settings);
    if let Err(e) = &result {
        tlog!("[ethocan] {}", e);
    }
    logging::stop_file_logging();
    result
}

#[cfg(target_os = "linux")]
fn run_bridge(settings: &BridgeSettings) -> Result<(), String> {
    use bridge::{Bridge, TransportMode};
    use io::gpio::SysfsGpio;
    use io::poll::PollSet;
    use io::serial::port::{SerialChannel, SerialConfig};
    use io::tap::TapDevice;
    use io::SenseLine;

    let tty_device = settings.tty_device.as_deref().unwrap_or_default();
    let tap_device = settings.tap_device.as_deref().unwrap_or_default();

    let serial = SerialChannel::open(&SerialConfig {
        port: tty_device.to_string(),
        baud_rate: settings.baud_rate,
        format: settings.line_format(),
    })?;
    let tap = TapDevice::open(tap_device)?;
    let sense_gpio = match (settings.mode, &settings.sense_gpio) {
        (TransportMode::Native, Some(pin_dir)) => Some(SysfsGpio::open(pin_dir)?),
        _ => None,
    };

    tlog!(
        "[ethocan] Bridging {} <-> {} ({} mode)",
        tap.name(),
        serial.name(),
        settings.mode
    );
    if let Some(gpio) = &sense_gpio {
        tlog!("[ethocan] Waiting on sense line {}", gpio.path().display());
    }
    let sense = sense_gpio.map(|gpio| Box::new(gpio) as Box<dyn SenseLine>);

    let mux = PollSet::new(&tap, &serial);
    let mut bridge = Bridge::new(settings.link_config(), tap, serial, sense, mux)?;
    bridge.run().map_err(String::from)
}

#[cfg(not(target_os = "linux"))]
fn run_bridge(_settings: &BridgeSettings) -> Result<(), String> {
    Err("ethocan needs Linux (TAP interface and sysfs GPIO)".to_string())
}
