// src/io/tap.rs
//
// TAP interface acquisition (Linux).
//
// Opens the tun clone device and attaches it to a named TAP interface with
// no packet-information header, so every read yields exactly one Ethernet
// frame and every write injects one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

const TUN_CLONE_DEVICE: &str = "/dev/net/tun";

const IFNAMSIZ: usize = 16;
const IFF_TAP: i16 = 0x0002;
const IFF_NO_PI: i16 = 0x1000;

nix::ioctl_write_int!(tunsetiff, b'T', 202);

/// `struct ifreq` as far as TUNSETIFF reads it: name and flags, padded to
/// the kernel's size.
#[repr(C)]
struct IfReq {
    name: [u8; IFNAMSIZ],
    flags: i16,
    _pad: [u8; 22],
}

impl IfReq {
    fn new(name: &str, flags: i16) -> Result<Self, String> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= IFNAMSIZ {
            return Err(format!(
                "Invalid interface name '{}': must be 1..{} bytes",
                name,
                IFNAMSIZ - 1
            ));
        }
        let mut req = IfReq {
            name: [0; IFNAMSIZ],
            flags,
            _pad: [0; 22],
        };
        req.name[..bytes.len()].copy_from_slice(bytes);
        Ok(req)
    }
}

/// Attached TAP interface.
pub struct TapDevice {
    file: File,
    name: String,
}

impl TapDevice {
    pub fn open(name: &str) -> Result<Self, String> {
        let req = IfReq::new(name, IFF_TAP | IFF_NO_PI)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_CLONE_DEVICE)
            .map_err(|e| format!("Failed to open {}: {}", TUN_CLONE_DEVICE, e))?;

        // SAFETY: `req` is a live, correctly sized ifreq for the duration of the call.
        unsafe { tunsetiff(file.as_raw_fd(), &req as *const IfReq as _) }
            .map_err(|e| format!("Failed to attach TAP interface {}: {}", name, e))?;

        tlog!("[tap] Attached to {}", name);
        Ok(TapDevice {
            file,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Read for TapDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TapDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AsRawFd for TapDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
