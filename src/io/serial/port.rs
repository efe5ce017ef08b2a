// src/io/serial/port.rs
//
// Serial device acquisition.
//
// The tty is opened through serialport in raw mode with no flow control.
// Readiness is taken from poll(2) on the descriptor so the per-octet
// timeouts are exact rather than bounded by the port's read timeout.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use serialport::{FlowControl, TTYPort};

use super::utils::{
    to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, LineFormat,
};
use crate::io::{poll, SerialLine};

/// Read timeout handed to serialport. Reads only happen after poll reported
/// data, so this just bounds a spurious wake-up.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial port configuration
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub format: LineFormat,
}

/// Open tty plus the readiness wait the link layer needs.
pub struct SerialChannel {
    port: TTYPort,
    name: String,
}

impl SerialChannel {
    pub fn open(config: &SerialConfig) -> Result<Self, String> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.format.data_bits)?)
            .stop_bits(to_serialport_stop_bits(config.format.stop_bits)?)
            .parity(to_serialport_parity(config.format.parity))
            .flow_control(FlowControl::None)
            .timeout(PORT_READ_TIMEOUT)
            .open_native()
            .map_err(|e| format!("Failed to open {}: {}", config.port, e))?;

        tlog!(
            "[serial] Opened {} at {} baud ({})",
            config.port,
            config.baud_rate,
            config.format.describe()
        );

        Ok(SerialChannel {
            port,
            name: config.port.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLine for SerialChannel {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        poll::wait_readable(self.port.as_raw_fd(), timeout, "serial")
    }
}

impl AsRawFd for SerialChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.port.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails_with_context() {
        let config = SerialConfig {
            port: "/dev/ethocan-no-such-tty".to_string(),
            baud_rate: 115_200,
            format: LineFormat::default(),
        };
        let err = SerialChannel::open(&config).err().expect("open must fail");
        assert!(err.starts_with("Failed to open /dev/ethocan-no-such-tty"));
    }

    #[test]
    fn test_open_rejects_bad_format() {
        let config = SerialConfig {
            port: "/dev/ethocan-no-such-tty".to_string(),
            baud_rate: 115_200,
            format: LineFormat {
                data_bits: 9,
                ..Default::default()
            },
        };
        let err = SerialChannel::open(&config).err().expect("format rejected");
        assert!(err.contains("data bits"));
    }
}
