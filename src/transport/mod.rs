//! Transport: the seam between the connection manager and the network.
//!
//! DESIGN
//! ======
//! A `Connector` turns a URL into a live `Connection` handle and reports
//! everything that happens afterwards (open, inbound text, failure, close)
//! as `TransportEnvelope`s on the sink it was given. The manager never sees
//! a socket directly, so the state machine runs unchanged against the
//! tungstenite connector in production and a scripted fake in tests.
//!
//! Construction failures are returned synchronously from `open`; everything
//! after that is asynchronous and arrives as events.

pub mod tungstenite;
pub mod types;

#[cfg(test)]
pub mod test_helpers;

pub use types::{ConnectionId, EventSink, ReadyCell, ReadyState, TransportEnvelope, TransportError, TransportEvent};

/// Opens connections. One connector serves every connection attempt a
/// manager makes.
pub trait Connector {
    /// Begin connecting to `url`. Returns immediately; completion is reported
    /// on `events` tagged with `id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the attempt cannot even be started (malformed
    /// URL, no runtime). No events follow in that case.
    fn open(&self, id: ConnectionId, url: &str, events: EventSink) -> Result<Box<dyn Connection>, TransportError>;
}

/// Handle to one connection attempt.
pub trait Connection: Send {
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame for transmission. Fire-and-forget: success means
    /// the frame was accepted, not delivered.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the handle is not open.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Request closure. Safe to call in any ready state, including before
    /// the handshake finished, and more than once.
    fn close(&mut self);
}
