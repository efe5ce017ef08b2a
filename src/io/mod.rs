// src/io/mod.rs
//
// Channel abstractions for the bridge.
//
// The link-layer core only ever talks to these traits. Real descriptors (tty,
// TAP, sysfs GPIO) are acquired by the platform modules at startup; tests use
// the scripted fakes in `fake`.

mod error;
pub mod serial;

#[cfg(target_os = "linux")]
pub mod gpio;
#[cfg(target_os = "linux")]
pub mod poll;
#[cfg(target_os = "linux")]
pub mod tap;

#[cfg(test)]
pub(crate) mod fake;

pub use error::LinkError;

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;

// ============================================================================
// Serial Line
// ============================================================================

/// Byte-oriented serial channel that can be polled for readability.
pub trait SerialLine: Read + Write {
    /// Wait up to `timeout` for at least one byte to become readable.
    /// Returns `Ok(false)` when the timeout elapsed with nothing to read.
    fn wait_readable(&mut self, timeout: Duration) -> std::io::Result<bool>;
}

// ============================================================================
// Sense (Flow-Control) Line
// ============================================================================

/// Logic level of the flow-control sense line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Parse the textual GPIO value ("0"/"1", trailing newline allowed).
    pub fn from_sysfs(value: &[u8]) -> Option<Level> {
        match value.first() {
            Some(b'0') => Some(Level::Low),
            Some(b'1') => Some(Level::High),
            _ => None,
        }
    }
}

/// Out-of-band readiness signal from the peer (native mode only).
pub trait SenseLine {
    /// Read the current level of the line.
    fn level(&mut self) -> std::io::Result<Level>;

    /// Block until the line changes state or `timeout` elapses.
    /// Returns `Ok(false)` on timeout.
    fn wait_edge(&mut self, timeout: Duration) -> std::io::Result<bool>;
}

// ============================================================================
// Readiness Multiplexer
// ============================================================================

/// Which side of the bridge has data waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub network: bool,
    pub serial: bool,
}

/// Blocks until the network interface or the serial line is readable.
pub trait Multiplexer {
    fn wait(&mut self) -> Result<Readiness, LinkError>;
}
