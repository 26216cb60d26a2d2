//! Error types reported by connections.
//!
//! A connection error is never fatal to a replay run on its own: the
//! driver treats it as a fault and reconstructs the connection. Faults
//! induced by fuzzing (the peer resetting or closing) are the expected
//! outcome, so variants describe what happened rather than how bad it is.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors produced by a [`Connection`](crate::Connection) or
/// [`Connector`](crate::Connector).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The underlying socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// TLS setup or record processing failed.
    #[error("TLS error: {reason}")]
    Tls {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The connection preface or initial SETTINGS exchange failed.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The peer sent GOAWAY.
    #[error("peer sent GOAWAY (error code {error_code:#x}, last stream {last_stream_id})")]
    GoAway {
        /// Error code carried by the GOAWAY frame.
        error_code: u32,
        /// Highest stream ID the peer processed.
        last_stream_id: u32,
    },
    /// The peer closed the transport.
    #[error("connection closed by peer")]
    Closed,
    /// A connect or write did not complete within the configured bound.
    #[error("operation timed out after {timeout:?}")]
    TimedOut {
        /// The bound that was exceeded.
        timeout: Duration,
    },
}

impl ConnectionError {
    /// Whether this error was caused by an I/O bound being exceeded.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::TimedOut { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
