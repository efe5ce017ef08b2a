// src/io/serial/native.rs
//
// Native-mode framing: a 16-bit big-endian length prefix followed by the raw
// payload. The CAN controller on the other end handles arbitration and
// integrity, so there is no echo check and no CRC here. Before sending we
// wait for the peer to signal readiness on the sense line.

use std::io::ErrorKind;
use std::time::Duration;

use super::octet::flush_pending_data;
use crate::io::{Level, LinkError, SenseLine, SerialLine};

/// Size of the length prefix on the wire.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Timing and limits for the native path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeTiming {
    /// Largest payload accepted in either direction.
    pub mtu: usize,
    /// Budget for each readiness wait while receiving.
    pub read_timeout: Duration,
    /// Budget for each sense-line edge wait before sending.
    pub sense_timeout: Duration,
    /// Sense level meaning "peer ready to receive".
    pub ready_level: Level,
}

// =============================================================================
// Receive (serial -> network)
// =============================================================================

/// Read exactly `expected` bytes, waiting at most `timeout` for each chunk.
pub fn read_bytes<S: SerialLine + ?Sized>(
    line: &mut S,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<u8>, LinkError> {
    let mut buf = vec![0u8; expected];
    let mut received = 0;
    while received < expected {
        if !line.wait_readable(timeout)? {
            tdebug!("--> SHORT READ {}/{}", received, expected);
            return Err(LinkError::Timeout);
        }
        let n = line.read(&mut buf[received..])?;
        if n == 0 {
            return Err(LinkError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "serial line closed",
            )));
        }
        received += n;
    }
    Ok(buf)
}

/// Receive one length-prefixed frame.
///
/// A prefix announcing more than `mtu` bytes cannot be honoured; whatever is
/// already queued on the line is dropped and the frame reported as too large.
pub fn receive_frame<S: SerialLine + ?Sized>(
    line: &mut S,
    timing: &NativeTiming,
) -> Result<Vec<u8>, LinkError> {
    let prefix = read_bytes(line, LENGTH_PREFIX_LEN, timing.read_timeout)?;
    let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
    if len > timing.mtu {
        let dropped = flush_pending_data(line)?;
        tdebug!("--> LENGTH {} > MTU {}, dropped {} bytes", len, timing.mtu, dropped);
        return Err(LinkError::BufferExceeded { limit: timing.mtu });
    }
    read_bytes(line, len, timing.read_timeout)
}

// =============================================================================
// Send (network -> serial)
// =============================================================================

/// Build the wire image: big-endian length then payload.
pub fn encode_frame(payload: &[u8], mtu: usize) -> Result<Vec<u8>, LinkError> {
    let limit = mtu.min(u16::MAX as usize);
    if payload.len() > limit {
        return Err(LinkError::BufferExceeded { limit });
    }
    let mut packet = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Block until the sense line shows `ready`, re-reading it after every edge.
/// An edge wait that runs out of time gives up with `Timeout`.
pub fn wait_until_ready<G: SenseLine + ?Sized>(
    sense: &mut G,
    ready: Level,
    timeout: Duration,
) -> Result<(), LinkError> {
    loop {
        let level = sense.level()?;
        if level == ready {
            return Ok(());
        }
        tdebug!("--> PEER BUSY (sense {:?})", level);
        if !sense.wait_edge(timeout)? {
            return Err(LinkError::Timeout);
        }
    }
}

/// Send one frame once the peer is ready. Returns the payload length.
pub fn send_frame<S, G>(
    line: &mut S,
    sense: &mut G,
    payload: &[u8],
    timing: &NativeTiming,
) -> Result<usize, LinkError>
where
    S: SerialLine + ?Sized,
    G: SenseLine + ?Sized,
{
    let packet = encode_frame(payload, timing.mtu)?;
    wait_until_ready(sense, timing.ready_level, timing.sense_timeout)?;
    line.write_all(&packet)?;
    line.flush()?;
    Ok(payload.len())
}
