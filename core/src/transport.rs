//! Outbound half of a live connection.
//!
//! The registry only ever talks to a connection through this trait. Sends are
//! synchronous and must not block: implementations enqueue the frame (for
//! example into a bounded channel drained by a socket writer task) and report
//! failure immediately when they cannot.

use crate::envelope::Envelope;
use std::fmt;
use thiserror::Error;

/// Why a transport is being closed by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The same user opened a newer connection
    Superseded,
    /// No inbound traffic within the idle timeout
    Idle,
    /// An outbound send failed; the peer is gone or not keeping up
    SendFailed,
    /// Server is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Superseded => "superseded by a newer connection",
            Self::Idle => "idle timeout",
            Self::SendFailed => "outbound delivery failed",
            Self::Shutdown => "server shutting down",
        })
    }
}

/// Delivery failure on a single transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer or writer task is gone
    #[error("transport closed")]
    Closed,

    /// Outbound buffer is full; the peer is not keeping up
    #[error("transport backlog full")]
    Backlogged,

    /// Envelope could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),
}

/// A handle that can push envelopes to one client.
pub trait Transport: Send + Sync {
    /// Enqueues `envelope` for delivery.
    ///
    /// # Errors
    ///
    /// Any error means the connection should be treated as dead.
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Asks the transport to shut down. Idempotent.
    fn close(&self, reason: CloseReason);
}
