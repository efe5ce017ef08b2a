// src/bridge.rs
//
// The bridge loop.
//
// One thread, one direction per iteration: wait until the TAP interface or
// the serial line is readable, move one frame across, repeat. Per-frame
// failures are logged and the frame dropped; only a descriptor that has gone
// away ends the loop.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::io::serial::{framer, native, NativeTiming};
use crate::io::{Level, LinkError, Multiplexer, SenseLine, SerialLine};

// ============================================================================
// Configuration
// ============================================================================

/// Framing used on the serial side, fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Byte stuffing, CRC and echo-checked octets.
    Emulated,
    /// Length prefix, gated by the sense line.
    Native,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emulated" => Ok(TransportMode::Emulated),
            "native" => Ok(TransportMode::Native),
            other => Err(format!(
                "Unknown mode '{}' (expected 'emulated' or 'native')",
                other
            )),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Emulated => write!(f, "emulated"),
            TransportMode::Native => write!(f, "native"),
        }
    }
}

/// Emulated-mode transmit retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Upper bound (inclusive) of the random part of the backoff.
    pub jitter_us: u64,
    /// Per-octet timeout; twice this is added to every backoff.
    pub octet_timeout: Duration,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before the next attempt: uniform jitter plus two octet timeouts.
    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter = rng.gen_range(0..=self.jitter_us);
        Duration::from_micros(jitter) + self.octet_timeout * 2
    }
}

/// Everything the loop needs to know about the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub mode: TransportMode,
    pub mtu: usize,
    pub octet_timeout: Duration,
    pub retry: RetryPolicy,
    pub native: NativeTiming,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let octet_timeout = Duration::from_micros(5000);
        LinkConfig {
            mode: TransportMode::Native,
            mtu: 2048,
            octet_timeout,
            retry: RetryPolicy {
                max_retries: 3,
                jitter_us: 4095,
                octet_timeout,
            },
            native: NativeTiming {
                mtu: 2048,
                read_timeout: Duration::from_millis(500),
                sense_timeout: Duration::from_millis(500),
                ready_level: Level::Low,
            },
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-direction frame counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// TAP > TTY frames delivered onto the bus.
    pub frames_sent: u64,
    /// TAP > TTY frames given up on.
    pub frames_dropped: u64,
    /// Extra transmit attempts after a failure.
    pub retries: u64,
    /// TAP < TTY frames delivered to the interface.
    pub frames_received: u64,
    pub rx_corrupt: u64,
    pub rx_oversized: u64,
    pub rx_timeouts: u64,
    /// Reads/writes on the TAP side that failed.
    pub network_errors: u64,
}

impl fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {}, dropped {}, retries {}, received {}, corrupt {}, oversized {}, rx timeouts {}, tap errors {}",
            self.frames_sent,
            self.frames_dropped,
            self.retries,
            self.frames_received,
            self.rx_corrupt,
            self.rx_oversized,
            self.rx_timeouts,
            self.network_errors
        )
    }
}

// ============================================================================
// Bridge
// ============================================================================

pub struct Bridge<N, S, M> {
    config: LinkConfig,
    net: N,
    serial: S,
    sense: Option<Box<dyn SenseLine>>,
    mux: M,
    rng: StdRng,
    stats: BridgeStats,
}

impl<N, S, M> Bridge<N, S, M>
where
    N: Read + Write,
    S: SerialLine,
    M: Multiplexer,
{
    /// Assemble a bridge over already-open channels. Native mode needs a sense line.
    pub fn new(
        config: LinkConfig,
        net: N,
        serial: S,
        sense: Option<Box<dyn SenseLine>>,
        mux: M,
    ) -> Result<Self, String> {
        if config.mode == TransportMode::Native && sense.is_none() {
            return Err("Native mode requires a sense line".to_string());
        }
        Ok(Bridge {
            config,
            net,
            serial,
            sense,
            mux,
            rng: StdRng::from_entropy(),
            stats: BridgeStats::default(),
        })
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Run until a descriptor fails.
    pub fn run(&mut self) -> Result<(), LinkError> {
        tlog!("[bridge] Running in {} mode, MTU {}", self.config.mode, self.config.mtu);
        loop {
            if let Err(e) = self.run_once() {
                tlog!("[bridge] Stopping: {}", e);
                tlog!("[bridge] {}", self.stats);
                return Err(e);
            }
        }
    }

    /// Wait for readiness and service exactly one direction.
    pub fn run_once(&mut self) -> Result<(), LinkError> {
        let ready = self.mux.wait()?;
        match self.config.mode {
            TransportMode::Emulated if ready.network => self.tap_to_tty(),
            TransportMode::Emulated if ready.serial => self.tty_to_tap(),
            TransportMode::Native if ready.serial => self.tty_to_tap(),
            TransportMode::Native if ready.network => self.tap_to_tty(),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // TAP > TTY
    // ------------------------------------------------------------------------

    fn tap_to_tty(&mut self) -> Result<(), LinkError> {
        let mut frame = vec![0u8; self.config.mtu];
        let len = match self.net.read(&mut frame) {
            Ok(0) => {
                return Err(LinkError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "TAP interface closed",
                )))
            }
            Ok(n) => n,
            Err(e) => return self.network_failure("read", e),
        };
        frame.truncate(len);
        tdebug!("--> TAP FRAME {}", hex::encode(&frame));

        match self.config.mode {
            TransportMode::Emulated => self.send_emulated(&frame),
            TransportMode::Native => self.send_native(&frame),
        }
    }

    fn send_emulated(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let policy = self.config.retry;
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            match framer::send_frame(&mut self.serial, frame, self.config.octet_timeout) {
                Ok(n) => {
                    tlog!("TAP > TTY: {} bytes ... sent.", n);
                    self.stats.frames_sent += 1;
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if attempt < attempts => {
                    let delay = policy.backoff(&mut self.rng);
                    tlog!(
                        "TAP > TTY: {} bytes ... failed ({}). Retry in {} us.",
                        frame.len(),
                        e,
                        delay.as_micros()
                    );
                    self.stats.retries += 1;
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    tlog!("TAP > TTY: {} bytes ... failed ({}). Drop.", frame.len(), e);
                    self.stats.frames_dropped += 1;
                }
            }
        }
        Ok(())
    }

    fn send_native(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let Some(sense) = self.sense.as_mut() else {
            return Err(LinkError::Io(std::io::Error::new(
                ErrorKind::NotConnected,
                "no sense line",
            )));
        };
        match native::send_frame(&mut self.serial, &mut **sense, frame, &self.config.native) {
            Ok(n) => {
                tlog!("TAP > TTY: {} bytes ... sent.", n);
                self.stats.frames_sent += 1;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tlog!("TAP > TTY: {} bytes ... failed ({}). Drop.", frame.len(), e);
                self.stats.frames_dropped += 1;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // TAP < TTY
    // ------------------------------------------------------------------------

    fn tty_to_tap(&mut self) -> Result<(), LinkError> {
        let received = match self.config.mode {
            TransportMode::Emulated => {
                framer::read_frame(&mut self.serial, self.config.mtu, self.config.octet_timeout)
            }
            TransportMode::Native => native::receive_frame(&mut self.serial, &self.config.native),
        };

        let frame = match received {
            Ok(frame) => frame,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                match e {
                    LinkError::FrameCorrupt { .. } => self.stats.rx_corrupt += 1,
                    LinkError::BufferExceeded { .. } => self.stats.rx_oversized += 1,
                    _ => self.stats.rx_timeouts += 1,
                }
                tlog!("TAP < TTY: frame discarded, {} ({}).", e.kind(), e);
                return Ok(());
            }
        };

        if frame.is_empty() {
            tdebug!("--> EMPTY FRAME");
            return Ok(());
        }
        tdebug!("--> TTY FRAME {}", hex::encode(&frame));
        if let Err(e) = self.net.write_all(&frame) {
            return self.network_failure("write", e);
        }
        tlog!("TAP < TTY: {} bytes received.", frame.len());
        self.stats.frames_received += 1;
        Ok(())
    }

    fn network_failure(&mut self, op: &str, err: std::io::Error) -> Result<(), LinkError> {
        let err = LinkError::from(err);
        if err.is_fatal() {
            return Err(err);
        }
        tlog!("[bridge] TAP {} failed: {}", op, err);
        self.stats.network_errors += 1;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fake::{FakeBus, FakeNet, FakeSense, ScriptedMux};
    use crate::io::Readiness;

    const NET: Readiness = Readiness {
        network: true,
        serial: false,
    };
    const SERIAL: Readiness = Readiness {
        network: false,
        serial: true,
    };
    const BOTH: Readiness = Readiness {
        network: true,
        serial: true,
    };

    fn config(mode: TransportMode) -> LinkConfig {
        let octet_timeout = Duration::from_micros(100);
        LinkConfig {
            mode,
            mtu: 2048,
            octet_timeout,
            retry: RetryPolicy {
                max_retries: 3,
                jitter_us: 0,
                octet_timeout,
            },
            native: NativeTiming {
                mtu: 2048,
                read_timeout: Duration::from_millis(1),
                sense_timeout: Duration::from_millis(1),
                ready_level: Level::Low,
            },
        }
    }

    fn ready_sense() -> Option<Box<dyn SenseLine>> {
        Some(Box::new(FakeSense::new(vec![Level::Low], vec![])))
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("emulated".parse::<TransportMode>().unwrap(), TransportMode::Emulated);
        assert_eq!("Native".parse::<TransportMode>().unwrap(), TransportMode::Native);
        assert!("slip".parse::<TransportMode>().is_err());
        assert_eq!(TransportMode::Emulated.to_string(), "emulated");
    }

    #[test]
    fn test_backoff_range() {
        let policy = RetryPolicy {
            max_retries: 3,
            jitter_us: 4095,
            octet_timeout: Duration::from_micros(5000),
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let delay = policy.backoff(&mut rng);
            assert!(delay >= Duration::from_micros(10_000));
            assert!(delay <= Duration::from_micros(10_000 + 4095));
        }
        assert_eq!(policy.attempts(), 4);
    }

    #[test]
    fn test_native_requires_sense() {
        let result = Bridge::new(
            config(TransportMode::Native),
            FakeNet::default(),
            FakeBus::default(),
            None,
            ScriptedMux::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_emulated_frame_goes_out() {
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::with_frames(vec![b"ping".to_vec()]),
            FakeBus::echoing(),
            None,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert_eq!(bridge.serial.wire, framer::encode_frame(b"ping"));
        assert_eq!(bridge.stats().frames_sent, 1);
    }

    #[test]
    fn test_emulated_retries_then_drops() {
        // No echo ever comes back: every attempt times out on its first octet.
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::with_frames(vec![b"lost".to_vec()]),
            FakeBus::default(),
            None,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        assert!(bridge.run_once().is_ok(), "drop is not an error");
        assert_eq!(bridge.serial.wire, vec![b'l'; 4], "exactly four attempts");
        assert_eq!(bridge.stats().retries, 3);
        assert_eq!(bridge.stats().frames_dropped, 1);
        assert_eq!(bridge.stats().frames_sent, 0);
    }

    #[test]
    fn test_emulated_collision_then_successful_retry() {
        let mut bus = FakeBus::echoing();
        bus.collide_at = Some((1, 0x00));
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::with_frames(vec![b"ping".to_vec()]),
            bus,
            None,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        let mut expected = b"pi".to_vec();
        expected.extend(framer::encode_frame(b"ping"));
        assert_eq!(bridge.serial.wire, expected, "aborted prefix, then the whole frame");
        assert_eq!(bridge.serial.wire.last(), Some(&framer::END));
        assert_eq!(bridge.stats().frames_sent, 1);
        assert_eq!(bridge.stats().retries, 1);
        assert_eq!(bridge.stats().frames_dropped, 0);
    }

    #[test]
    fn test_hung_up_serial_stops_without_retries() {
        let mut bus = FakeBus::echoing();
        bus.hung_up = true;
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::with_frames(vec![b"ping".to_vec()]),
            bus,
            None,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        let err = bridge.run_once().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bridge.stats().retries, 0);
        assert_eq!(bridge.stats().frames_dropped, 0);
    }

    #[test]
    fn test_emulated_receive_delivers_to_tap() {
        let wire = framer::encode_frame(&[0xFF, 0x01, 0xFE]);
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::default(),
            FakeBus::with_rx(&wire),
            None,
            ScriptedMux::new(vec![SERIAL]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert_eq!(bridge.net.delivered, vec![vec![0xFF, 0x01, 0xFE]]);
        assert_eq!(bridge.stats().frames_received, 1);
    }

    #[test]
    fn test_corrupt_frame_is_counted_not_delivered() {
        let mut wire = framer::encode_frame(b"data");
        wire[0] ^= 0x04;
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::default(),
            FakeBus::with_rx(&wire),
            None,
            ScriptedMux::new(vec![SERIAL]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert!(bridge.net.delivered.is_empty());
        assert_eq!(bridge.stats().rx_corrupt, 1);
    }

    #[test]
    fn test_emulated_services_network_first() {
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::with_frames(vec![b"out".to_vec()]),
            FakeBus::echoing(),
            None,
            ScriptedMux::new(vec![BOTH]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert_eq!(bridge.stats().frames_sent, 1);
        assert_eq!(bridge.stats().frames_received, 0);
    }

    #[test]
    fn test_native_services_serial_first() {
        let mut bridge = Bridge::new(
            config(TransportMode::Native),
            FakeNet::with_frames(vec![b"out".to_vec()]),
            FakeBus::with_rx(&[0x00, 0x02, b'i', b'n']),
            ready_sense(),
            ScriptedMux::new(vec![BOTH]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert_eq!(bridge.net.delivered, vec![b"in".to_vec()]);
        assert_eq!(bridge.net.inbound.len(), 1, "network side left for later");
        assert!(bridge.serial.wire.is_empty());
    }

    #[test]
    fn test_native_send() {
        let mut bridge = Bridge::new(
            config(TransportMode::Native),
            FakeNet::with_frames(vec![b"abc".to_vec()]),
            FakeBus::default(),
            ready_sense(),
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert_eq!(bridge.serial.wire, vec![0x00, 0x03, b'a', b'b', b'c']);
        assert_eq!(bridge.stats().frames_sent, 1);
    }

    #[test]
    fn test_native_busy_peer_drops_frame() {
        let sense: Option<Box<dyn SenseLine>> =
            Some(Box::new(FakeSense::new(vec![Level::High], vec![])));
        let mut bridge = Bridge::new(
            config(TransportMode::Native),
            FakeNet::with_frames(vec![b"abc".to_vec()]),
            FakeBus::default(),
            sense,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert!(bridge.serial.wire.is_empty());
        assert_eq!(bridge.stats().frames_dropped, 1);
    }

    #[test]
    fn test_run_stops_on_multiplexer_failure() {
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::with_frames(vec![b"one".to_vec()]),
            FakeBus::echoing(),
            None,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        let err = bridge.run().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bridge.stats().frames_sent, 1);
    }

    #[test]
    fn test_tap_read_error_is_not_fatal() {
        // Readiness claims a frame but the interface has nothing.
        let mut bridge = Bridge::new(
            config(TransportMode::Emulated),
            FakeNet::default(),
            FakeBus::echoing(),
            None,
            ScriptedMux::new(vec![NET]),
        )
        .unwrap();

        bridge.run_once().unwrap();
        assert_eq!(bridge.stats().network_errors, 1);
    }
}
