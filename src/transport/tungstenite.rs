//! tokio-tungstenite connector.
//!
//! DESIGN
//! ======
//! Each connection is one spawned task that performs the handshake, then
//! `select!`s between outbound commands from the handle and inbound frames
//! from the socket. The handle only holds the command sender, the shared
//! ready state, and the task's join handle.
//!
//! Event order per connection is `Opened`, then any number of `Message`,
//! then optionally `Failed`, then exactly one `Closed`. A failed handshake
//! yields `Failed` followed by `Closed`, matching browser socket semantics.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::{debug, info, warn};

use super::types::emit;
use super::{Connection, ConnectionId, Connector, EventSink, ReadyCell, ReadyState, TransportError, TransportEvent};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

enum Outbound {
    Text(String),
    Close,
}

// =============================================================================
// CONNECTOR
// =============================================================================

#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, id: ConnectionId, url: &str, events: EventSink) -> Result<Box<dyn Connection>, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connect(format!("no async runtime: {e}")))?;

        let ready = ReadyCell::new(ReadyState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let task = runtime.spawn(run_socket(id, request, self.connect_timeout, ready.clone(), outbound_rx, events));

        debug!(%id, %url, "ws: connect task spawned");
        Ok(Box::new(TungsteniteConnection { id, ready, outbound: outbound_tx, task }))
    }
}

// =============================================================================
// HANDLE
// =============================================================================

struct TungsteniteConnection {
    id: ConnectionId,
    ready: ReadyCell,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl Connection for TungsteniteConnection {
    fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.ready.get() != ReadyState::Open {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Text(text.to_owned()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        match self.ready.get() {
            ReadyState::Connecting => {
                // Handshake still in flight: drop it outright.
                self.task.abort();
                self.ready.set(ReadyState::Closed);
                debug!(id = %self.id, "ws: connect aborted");
            }
            ReadyState::Open => {
                self.ready.set(ReadyState::Closing);
                if self.outbound.send(Outbound::Close).is_err() {
                    debug!(id = %self.id, "ws: socket task already finished");
                }
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
    }
}

// =============================================================================
// SOCKET TASK
// =============================================================================

async fn run_socket(
    id: ConnectionId,
    request: Request,
    connect_timeout: Duration,
    ready: ReadyCell,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let stream = match tokio::time::timeout(connect_timeout, connect_async(request)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            finish(id, &ready, &events, Some(TransportError::Connect(e.to_string())));
            return;
        }
        Err(_) => {
            finish(id, &ready, &events, Some(TransportError::Timeout(connect_timeout.as_secs())));
            return;
        }
    };

    ready.set(ReadyState::Open);
    emit(&events, id, TransportEvent::Opened);
    info!(%id, "ws: connected");

    let (mut write, mut read) = stream.split();

    let failure = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        break Some(TransportError::Protocol(e.to_string()));
                    }
                }
                // Explicit close, or the handle was dropped.
                Some(Outbound::Close) | None => {
                    ready.set(ReadyState::Closing);
                    if let Err(e) = write.close().await {
                        debug!(%id, error = %e, "ws: close frame not delivered");
                    }
                    break None;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, id, TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(%id, len = bytes.len(), "ws: ignoring binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(%id, ?frame, "ws: peer closed");
                    ready.set(ReadyState::Closing);
                    // Flushes the close reply tungstenite queued on read.
                    if let Err(e) = write.close().await {
                        debug!(%id, error = %e, "ws: close reply not delivered");
                    }
                    break None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(TransportError::Protocol(e.to_string())),
                None => break None,
            },
        }
    };

    finish(id, &ready, &events, failure);
}

fn finish(id: ConnectionId, ready: &ReadyCell, events: &EventSink, failure: Option<TransportError>) {
    ready.set(ReadyState::Closed);
    if let Some(error) = failure {
        warn!(%id, error = %error, "ws: connection failed");
        emit(events, id, TransportEvent::Failed(error));
    }
    emit(events, id, TransportEvent::Closed);
    info!(%id, "ws: closed");
}
