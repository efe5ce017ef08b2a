// src/io/serial/framer.rs
//
// Emulated-mode framing: byte-stuffed frames with a CRC-16 trailer.
//
// Wire layout: escaped payload, escaped CRC (high byte first), raw END.
// Only END and ESC are escaped, by prefixing them with ESC; there is no
// substitution byte. Every octet goes out through the echo-verified octet
// transport, so a collision aborts the frame at the first mismatched byte.

use std::time::Duration;

use super::octet::{flush_pending_data, recv_octet, send_raw_octet};
use crate::checksums::{crc16_trailer, Crc16, CRC16_LEN};
use crate::io::{LinkError, SerialLine};

// =============================================================================
// Constants
// =============================================================================

/// Terminates a frame.
pub const END: u8 = 0xFF;
/// Marks the next octet as literal data.
pub const ESC: u8 = 0xFE;

// =============================================================================
// Encoding
// =============================================================================

/// Append `octet` to `out`, prefixed with ESC if it collides with a control byte.
pub fn escape_octet(octet: u8, out: &mut Vec<u8>) {
    if octet == END || octet == ESC {
        out.push(ESC);
    }
    out.push(octet);
}

/// Build the complete wire image of one frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    // Worst case every octet is escaped.
    let mut out = Vec::with_capacity(2 * (payload.len() + CRC16_LEN) + 1);
    for &octet in payload {
        escape_octet(octet, &mut out);
    }
    for octet in crc16_trailer(payload) {
        escape_octet(octet, &mut out);
    }
    out.push(END);
    out
}

/// Send one frame, echo-verifying every octet.
///
/// Stale bytes on the line are discarded first so they cannot be mistaken
/// for echoes. Returns the payload length on success; the first octet-level
/// failure aborts the frame and nothing further is written.
pub fn send_frame<S: SerialLine + ?Sized>(
    line: &mut S,
    payload: &[u8],
    octet_timeout: Duration,
) -> Result<usize, LinkError> {
    flush_pending_data(line)?;
    for octet in encode_frame(payload) {
        send_raw_octet(line, octet, octet_timeout)?;
    }
    Ok(payload.len())
}

// =============================================================================
// Decoding
// =============================================================================

/// Receive-side state of a frame in progress.
#[derive(Debug)]
pub enum DecodeState {
    /// Next octet is data, ESC or END.
    AwaitOctet,
    /// Previous octet was ESC; the next one is stored verbatim.
    Escaped,
    /// END seen and the CRC checked out.
    Done,
    /// Frame rejected; the buffer has been discarded.
    Failed(LinkError),
}

/// Incremental decoder for one frame.
///
/// The last two stored octets are held back from the running CRC: they are
/// the trailer if the next octet turns out to be END.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    capacity: usize,
    crc: Crc16,
    state: DecodeState,
}

impl FrameDecoder {
    /// Decoder for payloads up to `mtu` octets.
    pub fn new(mtu: usize) -> Self {
        let capacity = mtu + CRC16_LEN;
        FrameDecoder {
            buffer: Vec::with_capacity(capacity),
            capacity,
            crc: Crc16::new(),
            state: DecodeState::AwaitOctet,
        }
    }

    pub fn state(&self) -> &DecodeState {
        &self.state
    }

    /// Octets stored so far, trailer included.
    pub fn stored(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, DecodeState::Done | DecodeState::Failed(_))
    }

    /// Feed one received octet. Octets after the frame finished are ignored.
    pub fn push(&mut self, octet: u8) -> &DecodeState {
        match self.state {
            DecodeState::Done | DecodeState::Failed(_) => {}
            DecodeState::Escaped => {
                self.state = DecodeState::AwaitOctet;
                self.store(octet);
            }
            DecodeState::AwaitOctet => match octet {
                ESC => self.state = DecodeState::Escaped,
                END => self.finish(),
                _ => self.store(octet),
            },
        }
        &self.state
    }

    /// Consume the decoder, yielding the payload of a completed frame.
    pub fn into_payload(self) -> Result<Vec<u8>, LinkError> {
        match self.state {
            DecodeState::Done => Ok(self.buffer),
            DecodeState::Failed(e) => Err(e),
            // END never arrived.
            DecodeState::AwaitOctet | DecodeState::Escaped => Err(LinkError::Timeout),
        }
    }

    fn store(&mut self, octet: u8) {
        let stored = self.buffer.len();
        if stored >= self.capacity {
            self.fail(LinkError::BufferExceeded {
                limit: self.capacity,
            });
            return;
        }
        if stored >= CRC16_LEN {
            self.crc.push(self.buffer[stored - CRC16_LEN]);
        }
        self.buffer.push(octet);
    }

    fn finish(&mut self) {
        let stored = self.buffer.len();
        let mut crc = self.crc;
        for &octet in &self.buffer[stored.saturating_sub(CRC16_LEN)..] {
            crc.push_trailer(octet);
        }
        if stored < CRC16_LEN || !crc.is_residual_zero() {
            self.fail(LinkError::FrameCorrupt {
                residual: crc.value(),
            });
            return;
        }
        self.buffer.truncate(stored - CRC16_LEN);
        self.state = DecodeState::Done;
    }

    fn fail(&mut self, err: LinkError) {
        self.buffer.clear();
        self.state = DecodeState::Failed(err);
    }
}

/// Receive one frame, waiting at most `octet_timeout` for each octet.
///
/// A timeout or read failure mid-frame discards everything received so far.
pub fn read_frame<S: SerialLine + ?Sized>(
    line: &mut S,
    mtu: usize,
    octet_timeout: Duration,
) -> Result<Vec<u8>, LinkError> {
    let mut decoder = FrameDecoder::new(mtu);
    tdebug!("--> START OF FRAME");
    loop {
        let octet = match recv_octet(line, octet_timeout) {
            Ok(octet) => octet,
            Err(e) => {
                tdebug!("--> ABORT after {} octets: {}", decoder.stored(), e);
                return Err(e);
            }
        };
        tdebug!("RCV 0x{:02x} ({:04})", octet, decoder.stored());
        decoder.push(octet);
        if decoder.is_finished() {
            tdebug!("--> END OF FRAME");
            return decoder.into_payload();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
