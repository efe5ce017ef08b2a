// src/io/serial/mod.rs
//
// Serial side of the bridge.
//
// - octet: echo-verified single-byte transport
// - framer: emulated mode (byte stuffing + CRC-16)
// - native: length-prefixed frames gated by the sense line
// - port: tty acquisition

pub mod framer;
pub mod native;
pub mod octet;
#[cfg(target_os = "linux")]
pub mod port;
pub(crate) mod utils;

pub use native::NativeTiming;
pub use utils::{LineFormat, Parity};
