//! Transport types: events, ready state, and errors shared by every
//! connector implementation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

// =============================================================================
// ERROR
// =============================================================================

/// Why a connection attempt or an open connection failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The URL could not be turned into a handshake request.
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),

    /// The handshake failed (DNS, refused, TLS, HTTP upgrade rejected).
    #[error("connect failed: {0}")]
    Connect(String),

    /// The handshake did not complete within the connect timeout.
    #[error("connect timed out after {0}s")]
    Timeout(u64),

    /// The socket failed after it opened.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The handle is not open for writing.
    #[error("connection is not open")]
    Closed,
}

impl crate::ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::Connect(_) => "E_CONNECT",
            Self::Timeout(_) => "E_CONNECT_TIMEOUT",
            Self::Protocol(_) => "E_PROTOCOL",
            Self::Closed => "E_NOT_OPEN",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Protocol(_))
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Identifies one connection attempt. Allocated per `connect`, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The four transport callbacks, as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Failed(TransportError),
    Closed,
}

/// An event tagged with the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEnvelope {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

impl TransportEnvelope {
    #[must_use]
    pub fn new(connection: ConnectionId, event: TransportEvent) -> Self {
        Self { connection, event }
    }
}

/// Sender half of the manager's event queue, handed to each connection.
pub type EventSink = mpsc::UnboundedSender<TransportEnvelope>;

/// Push an event. A closed queue means the manager is gone.
pub fn emit(sink: &EventSink, connection: ConnectionId, event: TransportEvent) {
    if sink.send(TransportEnvelope::new(connection, event)).is_err() {
        tracing::trace!(%connection, "transport: event dropped; manager gone");
    }
}

// =============================================================================
// READY STATE
// =============================================================================

/// Write-readiness of a socket, mirroring the browser `readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Ready state shared between a connection handle and its socket task.
#[derive(Debug, Clone)]
pub struct ReadyCell(Arc<AtomicU8>);

impl ReadyCell {
    #[must_use]
    pub fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    #[must_use]
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
