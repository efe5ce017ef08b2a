// src/io/fake.rs
//
// Scripted stand-ins for the serial bus, TAP interface, sense line and
// readiness multiplexer. Test-only.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{Level, LinkError, Multiplexer, Readiness, SenseLine, SerialLine};

// ============================================================================
// Half-Duplex Bus
// ============================================================================

/// Simulated shared bus: every written byte lands on `wire` and, when `echo`
/// is on, is reflected back into the receive queue.
#[derive(Default)]
pub(crate) struct FakeBus {
    /// Bytes waiting to be read.
    pub rx: VecDeque<u8>,
    /// Every byte written, in order.
    pub wire: Vec<u8>,
    pub echo: bool,
    /// Index (into `wire`) of a byte whose echo is replaced with another value.
    pub collide_at: Option<(usize, u8)>,
    /// When true, writes accept zero bytes.
    pub stalled: bool,
    /// When true, readiness waits report a dead descriptor.
    pub hung_up: bool,
}

impl FakeBus {
    /// Bus that echoes every byte, like the real transceiver.
    pub fn echoing() -> Self {
        FakeBus {
            echo: true,
            ..Default::default()
        }
    }

    /// Bus with `bytes` already waiting to be read and no echo.
    pub fn with_rx(bytes: &[u8]) -> Self {
        FakeBus {
            rx: bytes.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl Read for FakeBus {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for FakeBus {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stalled {
            return Ok(0);
        }
        for &byte in buf {
            let index = self.wire.len();
            self.wire.push(byte);
            if self.echo {
                let echoed = match self.collide_at {
                    Some((at, other)) if at == index => other,
                    _ => byte,
                };
                self.rx.push_back(echoed);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLine for FakeBus {
    fn wait_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        if self.hung_up {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "serial descriptor failed"));
        }
        Ok(!self.rx.is_empty())
    }
}

// ============================================================================
// TAP Interface
// ============================================================================

/// Network side: frames queued in `inbound` are read one per call; frames
/// written are collected in `delivered`.
#[derive(Default)]
pub(crate) struct FakeNet {
    pub inbound: VecDeque<Vec<u8>>,
    pub delivered: Vec<Vec<u8>>,
}

impl FakeNet {
    pub fn with_frames(frames: Vec<Vec<u8>>) -> Self {
        FakeNet {
            inbound: frames.into(),
            delivered: Vec::new(),
        }
    }
}

impl Read for FakeNet {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inbound.pop_front() {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no frame")),
        }
    }
}

impl Write for FakeNet {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.delivered.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Sense Line
// ============================================================================

/// Sense line that reports `levels` in order (repeating the last one) and
/// answers edge waits from `edges` (timing out once exhausted).
#[derive(Default)]
pub(crate) struct FakeSense {
    pub levels: VecDeque<Level>,
    pub edges: VecDeque<bool>,
    pub level_reads: usize,
    pub broken: bool,
}

impl FakeSense {
    pub fn new(levels: Vec<Level>, edges: Vec<bool>) -> Self {
        FakeSense {
            levels: levels.into(),
            edges: edges.into(),
            ..Default::default()
        }
    }
}

impl SenseLine for FakeSense {
    fn level(&mut self) -> io::Result<Level> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::Other, "gpio read failed"));
        }
        self.level_reads += 1;
        let level = if self.levels.len() > 1 {
            self.levels.pop_front()
        } else {
            self.levels.front().copied()
        };
        level.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no level scripted"))
    }

    fn wait_edge(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(self.edges.pop_front().unwrap_or(false))
    }
}

// ============================================================================
// Readiness Multiplexer
// ============================================================================

/// Replays `script`; once exhausted reports the descriptors as gone.
#[derive(Default)]
pub(crate) struct ScriptedMux {
    pub script: VecDeque<Readiness>,
}

impl ScriptedMux {
    pub fn new(script: Vec<Readiness>) -> Self {
        ScriptedMux {
            script: script.into(),
        }
    }
}

impl Multiplexer for ScriptedMux {
    fn wait(&mut self) -> Result<Readiness, LinkError> {
        self.script.pop_front().ok_or_else(|| {
            LinkError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "script exhausted",
            ))
        })
    }
}
