//! Connection manager: the single live WebSocket, its status machine, and
//! the transcript of frames that cross it.
//!
//! DESIGN
//! ======
//! All transport callbacks arrive as `TransportEnvelope`s on one queue owned
//! by the manager. `handle_event` is the whole transition table:
//!
//! ```text
//! connect(url)      any        -> Connecting   (old handle closed first)
//! connect(url)      any        -> Error        (construction failed)
//! Opened            Connecting -> Connected
//! Failed            any        -> Error
//! Closed            any        -> Disconnected (handle cleared)
//! disconnect()      any        -> Disconnected (immediately, no ack wait)
//! ```
//!
//! Every connect allocates a fresh `ConnectionId`. Envelopes from any other
//! id are discarded, so a torn-down attempt can neither move the status nor
//! add transcript entries, and a late close from an old socket cannot
//! clobber the attempt that replaced it.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error. Failures surface as the `Error` status
//! (with the cause kept in `last_error`) or as `Outcome::NotConnected` from
//! `send`. The core never retries; reconnect policy belongs to callers.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Outcome;
use crate::transcript::{Transcript, TranscriptEntry};
use crate::transport::{
    Connection, ConnectionId, Connector, EventSink, ReadyState, TransportEnvelope, TransportError, TransportEvent,
};

// =============================================================================
// STATUS
// =============================================================================

/// The four user-visible connection conditions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Error => "Connection Failed",
        }
    }
}

struct ActiveConnection {
    id: ConnectionId,
    url: String,
    handle: Box<dyn Connection>,
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct ConnectionManager<C> {
    connector: C,
    status: ConnectionStatus,
    active: Option<ActiveConnection>,
    transcript: Transcript,
    last_error: Option<TransportError>,
    next_id: u64,
    events_tx: EventSink,
    events_rx: mpsc::UnboundedReceiver<TransportEnvelope>,
}

impl<C: Connector> ConnectionManager<C> {
    #[must_use]
    pub fn new(connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            status: ConnectionStatus::Disconnected,
            active: None,
            transcript: Transcript::new(),
            last_error: None,
            next_id: 0,
            events_tx,
            events_rx,
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Cause of the most recent failure. Cleared by `connect`.
    #[must_use]
    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// URL of the live handle, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.url.as_str())
    }

    #[must_use]
    pub fn active_id(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|a| a.id)
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Start a new connection attempt, tearing down any existing handle
    /// first. Completion is observed through `status()`.
    pub fn connect(&mut self, url: &str) {
        self.teardown();
        self.last_error = None;
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.status = ConnectionStatus::Connecting;

        match self.connector.open(id, url, self.events_tx.clone()) {
            Ok(handle) => {
                info!(%id, %url, "connection: connecting");
                self.active = Some(ActiveConnection { id, url: url.to_owned(), handle });
            }
            Err(e) => {
                warn!(%id, %url, error = %e, "connection: could not start");
                self.status = ConnectionStatus::Error;
                self.last_error = Some(e);
            }
        }
    }

    /// Close the live handle (if any) and report `Disconnected` right away.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.status = ConnectionStatus::Disconnected;
    }

    /// Transmit `content` verbatim and record it, only when the manager is
    /// `Connected` and the handle is open for writing.
    pub fn send(&mut self, content: &str) -> Outcome {
        if self.status != ConnectionStatus::Connected {
            return Outcome::NotConnected;
        }
        let Some(active) = self.active.as_mut() else {
            return Outcome::NotConnected;
        };
        if active.handle.ready_state() != ReadyState::Open {
            return Outcome::NotConnected;
        }
        if let Err(e) = active.handle.send_text(content) {
            debug!(id = %active.id, error = %e, "connection: send rejected by transport");
            return Outcome::NotConnected;
        }

        self.transcript.push(TranscriptEntry::sent(content));
        Outcome::Applied
    }

    /// Empty the transcript. Connection state is untouched.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!(id = %active.id, url = %active.url, "connection: closing handle");
            active.handle.close();
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Apply one transport event. Returns `false` when the envelope belongs
    /// to a handle that is no longer active and was discarded.
    pub fn handle_event(&mut self, envelope: TransportEnvelope) -> bool {
        let TransportEnvelope { connection, event } = envelope;
        if self.active_id() != Some(connection) {
            debug!(%connection, ?event, "connection: dropping event from stale handle");
            return false;
        }

        match event {
            TransportEvent::Opened => {
                if self.status == ConnectionStatus::Connecting {
                    self.status = ConnectionStatus::Connected;
                    info!(%connection, "connection: open");
                }
            }
            TransportEvent::Message(text) => {
                self.transcript.push(TranscriptEntry::received(text));
            }
            TransportEvent::Failed(e) => {
                warn!(%connection, error = %e, "connection: transport error");
                self.status = ConnectionStatus::Error;
                self.last_error = Some(e);
            }
            TransportEvent::Closed => {
                info!(%connection, "connection: closed");
                self.status = ConnectionStatus::Disconnected;
                self.active = None;
            }
        }
        true
    }

    /// Apply every event already queued. Returns how many were dequeued.
    pub fn drain_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            self.handle_event(envelope);
            count += 1;
        }
        count
    }

    /// Wait for the next transport event without applying it.
    ///
    /// The manager holds a sender for its own queue, so this only resolves
    /// when an event arrives.
    pub async fn next_event(&mut self) -> Option<TransportEnvelope> {
        self.events_rx.recv().await
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
