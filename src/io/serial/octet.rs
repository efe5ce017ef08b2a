// src/io/serial/octet.rs
//
// Octet transport over the half-duplex bus.
//
// Every byte we put on the bus comes straight back through the transceiver.
// A send is only good once that echo has been read back and matches; anything
// else means another node drove the line at the same time.

use std::io::ErrorKind;
use std::time::Duration;

use crate::io::{LinkError, SerialLine};

/// Read one byte, waiting at most `timeout` for it to arrive.
pub fn recv_octet<S: SerialLine + ?Sized>(
    line: &mut S,
    timeout: Duration,
) -> Result<u8, LinkError> {
    if !line.wait_readable(timeout)? {
        return Err(LinkError::Timeout);
    }
    let mut octet = [0u8; 1];
    match line.read(&mut octet)? {
        0 => Err(LinkError::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "serial line closed",
        ))),
        _ => Ok(octet[0]),
    }
}

/// Write one byte and verify its echo.
///
/// Fails with `Busy` if the line accepted nothing, `Timeout` if no echo came
/// back in time, and `LineContention` if the echo differs from what was sent.
/// A failing descriptor surfaces as `Io`.
pub fn send_raw_octet<S: SerialLine + ?Sized>(
    line: &mut S,
    octet: u8,
    timeout: Duration,
) -> Result<(), LinkError> {
    if line.write(&[octet])? == 0 {
        return Err(LinkError::Busy);
    }
    tdebug!("SND 0x{:02x}", octet);

    if !line.wait_readable(timeout)? {
        return Err(LinkError::Timeout);
    }
    let mut echo = [0u8; 1];
    if line.read(&mut echo)? == 0 {
        tdebug!("--> SHORT ECHO READ");
        return Err(LinkError::Timeout);
    }
    let echoed = echo[0];

    if echoed != octet {
        tdebug!("--> CONTENTION 0x{:02x} != 0x{:02x}", echoed, octet);
        return Err(LinkError::LineContention {
            sent: octet,
            echoed,
        });
    }
    Ok(())
}

/// Discard whatever is already waiting on the line without blocking.
/// Returns the number of bytes dropped.
pub fn flush_pending_data<S: SerialLine + ?Sized>(line: &mut S) -> Result<usize, LinkError> {
    let mut flushed = 0;
    let mut octet = [0u8; 1];
    while line.wait_readable(Duration::ZERO)? {
        match line.read(&mut octet) {
            Ok(0) => break,
            Ok(_) => {
                tdebug!("--> FLUSH 0x{:02x}", octet[0]);
                flushed += 1;
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) => return Err(LinkError::Io(e)),
        }
    }
    Ok(flushed)
}
