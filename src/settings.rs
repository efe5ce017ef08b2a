// src/settings.rs
//
// Bridge configuration: built-in defaults, an optional TOML file, then
// command-line overrides, in that order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::{LinkConfig, RetryPolicy, TransportMode};
use crate::io::serial::{LineFormat, NativeTiming, Parity};
use crate::io::Level;

/// Largest frame the 16-bit native length prefix can describe.
const MAX_MTU: usize = u16::MAX as usize;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeSettings {
    #[serde(default = "default_mode")]
    pub mode: TransportMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_device: Option<String>,
    /// sysfs directory of the sense GPIO, e.g. /sys/class/gpio/gpio17
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sense_gpio: Option<PathBuf>,

    // Serial line
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,

    // Link layer
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default = "default_octet_timeout_us")]
    pub octet_timeout_us: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_jitter_us")]
    pub backoff_jitter_us: u64,
    #[serde(default = "default_native_read_timeout_ms")]
    pub native_read_timeout_ms: u64,
    #[serde(default = "default_sense_timeout_ms")]
    pub sense_timeout_ms: u64,
    #[serde(default = "default_sense_ready_level")]
    pub sense_ready_level: Level,

    // Logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
}

fn default_mode() -> TransportMode {
    TransportMode::Native
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_mtu() -> usize {
    2048
}
fn default_octet_timeout_us() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_jitter_us() -> u64 {
    4095
}
fn default_native_read_timeout_ms() -> u64 {
    500
}
fn default_sense_timeout_ms() -> u64 {
    500
}
fn default_sense_ready_level() -> Level {
    Level::Low
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            tty_device: None,
            tap_device: None,
            sense_gpio: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            mtu: default_mtu(),
            octet_timeout_us: default_octet_timeout_us(),
            max_retries: default_max_retries(),
            backoff_jitter_us: default_backoff_jitter_us(),
            native_read_timeout_ms: default_native_read_timeout_ms(),
            sense_timeout_ms: default_sense_timeout_ms(),
            sense_ready_level: default_sense_ready_level(),
            log_dir: None,
            debug: false,
        }
    }
}

/// Values given on the command line. `None` leaves the setting untouched.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub mode: Option<TransportMode>,
    pub tty_device: Option<String>,
    pub tap_device: Option<String>,
    pub sense_gpio: Option<PathBuf>,
    pub baud_rate: Option<u32>,
    pub mtu: Option<usize>,
    pub octet_timeout_us: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
}

impl BridgeSettings {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if overrides.tty_device.is_some() {
            self.tty_device = overrides.tty_device;
        }
        if overrides.tap_device.is_some() {
            self.tap_device = overrides.tap_device;
        }
        if overrides.sense_gpio.is_some() {
            self.sense_gpio = overrides.sense_gpio;
        }
        if let Some(baud) = overrides.baud_rate {
            self.baud_rate = baud;
        }
        if let Some(mtu) = overrides.mtu {
            self.mtu = mtu;
        }
        if let Some(timeout) = overrides.octet_timeout_us {
            self.octet_timeout_us = timeout;
        }
        if overrides.log_dir.is_some() {
            self.log_dir = overrides.log_dir;
        }
        // A flag can only switch tracing on.
        self.debug |= overrides.debug;
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tty_device.as_deref().map_or(true, str::is_empty) {
            return Err("No serial device given (tty_device / --tty-device)".to_string());
        }
        if self.tap_device.as_deref().map_or(true, str::is_empty) {
            return Err("No TAP interface given (tap_device / --tap-device)".to_string());
        }
        if self.mode == TransportMode::Native && self.sense_gpio.is_none() {
            return Err("Native mode needs a sense GPIO (sense_gpio / --sense-gpio)".to_string());
        }
        if self.mtu == 0 || self.mtu > MAX_MTU {
            return Err(format!("MTU must be between 1 and {}, got {}", MAX_MTU, self.mtu));
        }
        if self.octet_timeout_us == 0 {
            return Err("octet_timeout_us must be greater than zero".to_string());
        }
        if self.baud_rate == 0 {
            return Err("baud_rate must be greater than zero".to_string());
        }
        self.line_format().validate()
    }

    pub fn line_format(&self) -> LineFormat {
        LineFormat {
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        let octet_timeout = Duration::from_micros(self.octet_timeout_us);
        LinkConfig {
            mode: self.mode,
            mtu: self.mtu,
            octet_timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                jitter_us: self.backoff_jitter_us,
                octet_timeout,
            },
            native: NativeTiming {
                mtu: self.mtu,
                read_timeout: Duration::from_millis(self.native_read_timeout_ms),
                sense_timeout: Duration::from_millis(self.sense_timeout_ms),
                ready_level: self.sense_ready_level,
            },
        }
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize settings: {}", e))
    }
}

pub fn parse_settings(content: &str) -> Result<BridgeSettings, String> {
    toml::from_str(content).map_err(|e| format!("Failed to parse settings: {}", e))
}

/// Defaults, or the given TOML file layered over them.
pub fn load_settings(path: Option<&Path>) -> Result<BridgeSettings, String> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;
            parse_settings(&content)
        }
        None => Ok(BridgeSettings::default()),
    }
}
