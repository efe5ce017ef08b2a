// src/io/poll.rs
//
// poll(2) readiness waits.
//
// `wait_fd` is the single-descriptor wait used by the serial channel and the
// sense line. `PollSet` is the bridge's readiness multiplexer over the TAP and
// serial descriptors; it is built once at startup and reused every iteration.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use super::{LinkError, Multiplexer, Readiness};

/// Conditions that mean the descriptor is no longer usable.
const FAILURE: PollFlags = PollFlags::POLLERR
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLNVAL);

/// Convert a timeout to poll's millisecond argument, rounding up so a
/// sub-millisecond budget still waits. `None` blocks indefinitely.
fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        Some(t) => ((t.as_micros() + 999) / 1000).min(i32::MAX as u128) as i32,
        None => -1,
    }
}

fn poll_retrying(fds: &mut [PollFd], timeout: Option<Duration>) -> io::Result<usize> {
    loop {
        match poll(fds, timeout_ms(timeout)) {
            Ok(n) => return Ok(n as usize),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(io::Error::from(e)),
        }
    }
}

/// Wait for `events` on one descriptor. Returns the reported events, or
/// `None` if the timeout elapsed first.
pub fn wait_fd(fd: RawFd, events: PollFlags, timeout: Duration) -> io::Result<Option<PollFlags>> {
    let mut fds = [PollFd::new(fd, events)];
    if poll_retrying(&mut fds, Some(timeout))? == 0 {
        return Ok(None);
    }
    Ok(Some(fds[0].revents().unwrap_or(PollFlags::empty())))
}

/// Interpret the events reported for an input descriptor.
fn readable(revents: Option<PollFlags>, what: &str) -> io::Result<bool> {
    let revents = revents.unwrap_or(PollFlags::empty());
    if revents.contains(PollFlags::POLLIN) {
        return Ok(true);
    }
    if revents.intersects(FAILURE) {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("{} descriptor failed ({:?})", what, revents),
        ));
    }
    Ok(false)
}

/// Wait up to `timeout` for `fd` to become readable.
pub fn wait_readable(fd: RawFd, timeout: Duration, what: &str) -> io::Result<bool> {
    match wait_fd(fd, PollFlags::POLLIN, timeout)? {
        Some(revents) => readable(Some(revents), what),
        None => Ok(false),
    }
}

// ============================================================================
// Bridge Multiplexer
// ============================================================================

/// Readiness set over the network and serial descriptors.
pub struct PollSet {
    network: RawFd,
    serial: RawFd,
}

impl PollSet {
    pub fn new(network: &impl AsRawFd, serial: &impl AsRawFd) -> Self {
        PollSet {
            network: network.as_raw_fd(),
            serial: serial.as_raw_fd(),
        }
    }
}

impl Multiplexer for PollSet {
    fn wait(&mut self) -> Result<Readiness, LinkError> {
        let mut fds = [
            PollFd::new(self.network, PollFlags::POLLIN),
            PollFd::new(self.serial, PollFlags::POLLIN),
        ];
        poll_retrying(&mut fds, None).map_err(LinkError::Io)?;
        Ok(Readiness {
            network: readable(fds[0].revents(), "network").map_err(LinkError::Io)?,
            serial: readable(fds[1].revents(), "serial").map_err(LinkError::Io)?,
        })
    }
}
