// src/io/error.rs
//
// Error taxonomy for the link-layer transport.
//
// Octet-level failures propagate unchanged through the frame codecs; the
// bridge loop decides whether a failure costs a retry, a dropped frame, or
// (for a vanished descriptor) the whole process.

use std::fmt;

/// Link-layer transport error.
#[derive(Debug)]
pub enum LinkError {
    /// The serial line accepted zero bytes on write.
    Busy,
    /// No byte, echo or readiness arrived within the budget.
    Timeout,
    /// The echoed byte differs from the byte written: another node collided.
    LineContention { sent: u8, echoed: u8 },
    /// CRC residual was not zero at the end of a frame.
    FrameCorrupt { residual: u16 },
    /// The frame outgrew the receive buffer before it ended.
    BufferExceeded { limit: usize },
    /// Any other descriptor failure.
    Io(std::io::Error),
}

impl LinkError {
    /// Wrap an I/O error, treating a timed-out or would-block read as `Timeout`
    /// and a zero-length write as `Busy`.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => LinkError::Timeout,
            std::io::ErrorKind::WriteZero => LinkError::Busy,
            _ => LinkError::Io(err),
        }
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::Busy => "busy",
            LinkError::Timeout => "timeout",
            LinkError::LineContention { .. } => "line contention",
            LinkError::FrameCorrupt { .. } => "frame corrupt",
            LinkError::BufferExceeded { .. } => "buffer exceeded",
            LinkError::Io(_) => "io",
        }
    }

    /// Whether the error means the descriptor itself is gone.
    pub fn is_fatal(&self) -> bool {
        match self {
            LinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Busy => write!(f, "serial line busy (zero bytes written)"),
            LinkError::Timeout => write!(f, "timed out waiting for the line"),
            LinkError::LineContention { sent, echoed } => write!(
                f,
                "line contention: sent 0x{:02x}, echo 0x{:02x}",
                sent, echoed
            ),
            LinkError::FrameCorrupt { residual } => {
                write!(f, "frame corrupt: CRC residual 0x{:04x}", residual)
            }
            LinkError::BufferExceeded { limit } => {
                write!(f, "frame exceeds buffer of {} bytes", limit)
            }
            LinkError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::from_io(err)
    }
}

impl From<LinkError> for String {
    fn from(err: LinkError) -> Self {
        err.to_string()
    }
}
