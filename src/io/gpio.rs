// src/io/gpio.rs
//
// Sense line on a sysfs GPIO (Linux).
//
// The pin directory (e.g. /sys/class/gpio/gpio17) is configured as an input
// with both-edge interrupts. The level is read by rewinding `value`; edges are
// reported by poll(2) as POLLPRI.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::poll::PollFlags;

use super::{poll, Level, SenseLine};

pub struct SysfsGpio {
    value: File,
    path: PathBuf,
}

impl SysfsGpio {
    pub fn open(pin_dir: &Path) -> Result<Self, String> {
        write_attr(pin_dir, "direction", "in")?;
        write_attr(pin_dir, "edge", "both")?;
        let value_path = pin_dir.join("value");
        let value = File::open(&value_path)
            .map_err(|e| format!("Failed to open {}: {}", value_path.display(), e))?;

        tlog!("[gpio] Sense line on {}", pin_dir.display());
        Ok(SysfsGpio {
            value,
            path: pin_dir.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_attr(pin_dir: &Path, attr: &str, value: &str) -> Result<(), String> {
    let path = pin_dir.join(attr);
    fs::write(&path, value).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

impl SenseLine for SysfsGpio {
    fn level(&mut self) -> io::Result<Level> {
        let mut raw = [0u8; 2];
        self.value.seek(SeekFrom::Start(0))?;
        let n = self.value.read(&mut raw)?;
        Level::from_sysfs(&raw[..n]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected GPIO value {:?}", &raw[..n]),
            )
        })
    }

    fn wait_edge(&mut self, timeout: Duration) -> io::Result<bool> {
        let revents = poll::wait_fd(
            self.value.as_raw_fd(),
            PollFlags::POLLPRI | PollFlags::POLLERR,
            timeout,
        )?;
        Ok(revents.map_or(false, |ev| ev.contains(PollFlags::POLLPRI)))
    }
}
