//! Scripted in-memory connector for driving the connection state machine
//! without a network.
//!
//! Every `open` records a socket. Tests then play the transport's part by
//! calling `accept`, `deliver`, `fail`, and `drop_socket`, which push the
//! same envelopes a real socket task would.

use std::sync::{Arc, Mutex};

use super::types::emit;
use super::{Connection, ConnectionId, Connector, EventSink, ReadyCell, ReadyState, TransportError, TransportEvent};

struct FakeSocket {
    id: ConnectionId,
    url: String,
    ready: ReadyCell,
    sent: Vec<String>,
    close_requested: bool,
    events: EventSink,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    sockets: Arc<Mutex<Vec<FakeSocket>>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs passed to `open`, in call order. Rejected URLs are not recorded.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.with_sockets(|sockets| sockets.iter().map(|s| s.url.clone()).collect())
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.with_sockets(|sockets| sockets.iter().map(|s| s.id).collect())
    }

    #[must_use]
    pub fn last_id(&self) -> ConnectionId {
        *self.ids().last().expect("no socket opened yet")
    }

    /// Complete the handshake for `id`.
    pub fn accept(&self, id: ConnectionId) {
        self.with_socket(id, |s| {
            s.ready.set(ReadyState::Open);
            emit(&s.events, id, TransportEvent::Opened);
        });
    }

    /// Deliver an inbound text frame on `id`.
    pub fn deliver(&self, id: ConnectionId, text: &str) {
        self.with_socket(id, |s| emit(&s.events, id, TransportEvent::Message(text.to_owned())));
    }

    /// Report a transport error on `id`. Does not close it.
    pub fn fail(&self, id: ConnectionId, reason: &str) {
        self.with_socket(id, |s| {
            emit(&s.events, id, TransportEvent::Failed(TransportError::Connect(reason.to_owned())));
        });
    }

    /// Report that `id` closed (peer close, network drop, or ack of a local close).
    pub fn drop_socket(&self, id: ConnectionId) {
        self.with_socket(id, |s| {
            s.ready.set(ReadyState::Closed);
            emit(&s.events, id, TransportEvent::Closed);
        });
    }

    /// Force the ready state without emitting anything.
    pub fn set_ready(&self, id: ConnectionId, state: ReadyState) {
        self.with_socket(id, |s| s.ready.set(state));
    }

    #[must_use]
    pub fn sent(&self, id: ConnectionId) -> Vec<String> {
        self.with_socket(id, |s| s.sent.clone())
    }

    #[must_use]
    pub fn close_requested(&self, id: ConnectionId) -> bool {
        self.with_socket(id, |s| s.close_requested)
    }

    fn with_sockets<R>(&self, f: impl FnOnce(&mut Vec<FakeSocket>) -> R) -> R {
        let mut sockets = self.sockets.lock().expect("fake socket mutex should lock");
        f(&mut sockets)
    }

    fn with_socket<R>(&self, id: ConnectionId, f: impl FnOnce(&mut FakeSocket) -> R) -> R {
        self.with_sockets(|sockets| {
            let socket = sockets
                .iter_mut()
                .find(|s| s.id == id)
                .expect("unknown fake socket id");
            f(socket)
        })
    }
}

impl Connector for FakeConnector {
    fn open(&self, id: ConnectionId, url: &str, events: EventSink) -> Result<Box<dyn Connection>, TransportError> {
        if !url.contains("://") {
            return Err(TransportError::InvalidUrl(url.to_owned()));
        }
        let ready = ReadyCell::new(ReadyState::Connecting);
        self.with_sockets(|sockets| {
            sockets.push(FakeSocket {
                id,
                url: url.to_owned(),
                ready: ready.clone(),
                sent: Vec::new(),
                close_requested: false,
                events,
            });
        });
        Ok(Box::new(FakeConnection { id, ready, sockets: Arc::clone(&self.sockets) }))
    }
}

struct FakeConnection {
    id: ConnectionId,
    ready: ReadyCell,
    sockets: Arc<Mutex<Vec<FakeSocket>>>,
}

impl Connection for FakeConnection {
    fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.ready.get() != ReadyState::Open {
            return Err(TransportError::Closed);
        }
        let mut sockets = self.sockets.lock().expect("fake socket mutex should lock");
        if let Some(socket) = sockets.iter_mut().find(|s| s.id == self.id) {
            socket.sent.push(text.to_owned());
        }
        Ok(())
    }

    fn close(&mut self) {
        if matches!(self.ready.get(), ReadyState::Connecting | ReadyState::Open) {
            self.ready.set(ReadyState::Closing);
        }
        let mut sockets = self.sockets.lock().expect("fake socket mutex should lock");
        if let Some(socket) = sockets.iter_mut().find(|s| s.id == self.id) {
            socket.close_requested = true;
        }
    }
}
