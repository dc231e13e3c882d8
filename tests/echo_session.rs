//! End-to-end: drive the connection manager against a real WebSocket echo
//! server over loopback.

use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use wsprobe::transport::tungstenite::TungsteniteConnector;
use wsprobe::{ConnectionManager, ConnectionStatus, Direction, Outcome};

const WAIT: Duration = Duration::from_secs(5);

async fn echo(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(run_echo)
}

async fn run_echo(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                if text.as_str() == "bye" {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Message::Binary(bytes) => {
                let _ = socket.send(Message::Binary(bytes)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Bind an echo server on an ephemeral port and return its ws:// URL.
async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    let app = Router::new().route("/ws", get(echo));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("echo server failed");
    });
    format!("ws://{addr}/ws")
}

/// Bind a server that closes every socket as soon as it opens and reports
/// whether the client answered with its own Close frame.
async fn spawn_hangup_server() -> (String, mpsc::UnboundedReceiver<bool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let tx = tx.clone();
            async move { ws.on_upgrade(move |socket| hang_up(socket, tx)) }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("hangup server failed");
    });
    (format!("ws://{addr}/ws"), rx)
}

async fn hang_up(mut socket: WebSocket, replies: mpsc::UnboundedSender<bool>) {
    if socket.send(Message::Close(None)).await.is_err() {
        return;
    }
    let answered = matches!(socket.recv().await, Some(Ok(Message::Close(_))));
    let _ = replies.send(answered);
}

/// Pump events until `status` is reached.
async fn wait_for_status(manager: &mut ConnectionManager<TungsteniteConnector>, status: ConnectionStatus) {
    tokio::time::timeout(WAIT, async {
        while manager.status() != status {
            let envelope = manager.next_event().await.expect("event queue closed");
            manager.handle_event(envelope);
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {status:?}; now {:?}", manager.status()));
}

/// Pump events until the transcript holds `len` entries.
async fn wait_for_entries(manager: &mut ConnectionManager<TungsteniteConnector>, len: usize) {
    tokio::time::timeout(WAIT, async {
        while manager.transcript().len() < len {
            let envelope = manager.next_event().await.expect("event queue closed");
            manager.handle_event(envelope);
        }
    })
    .await
    .expect("timed out waiting for transcript entries");
}

#[tokio::test]
async fn send_and_receive_through_echo_server() {
    let url = spawn_echo_server().await;
    let mut manager = ConnectionManager::new(TungsteniteConnector::default());

    manager.connect(&url);
    assert_eq!(manager.status(), ConnectionStatus::Connecting);
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    assert_eq!(manager.send("{\"ping\":1}"), Outcome::Applied);
    wait_for_entries(&mut manager, 2).await;

    let entries = manager.transcript().entries();
    assert_eq!(entries[0].direction, Direction::Sent);
    assert_eq!(entries[1].direction, Direction::Received);
    assert_eq!(entries[1].content, "{\"ping\":1}");

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(manager.send("late"), Outcome::NotConnected);
}

#[tokio::test]
async fn server_close_lands_disconnected() {
    let url = spawn_echo_server().await;
    let mut manager = ConnectionManager::new(TungsteniteConnector::default());

    manager.connect(&url);
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    assert_eq!(manager.send("bye"), Outcome::Applied);

    wait_for_status(&mut manager, ConnectionStatus::Disconnected).await;
    assert!(manager.last_error().is_none());
}

#[tokio::test]
async fn server_initiated_close_is_answered() {
    let (url, mut replies) = spawn_hangup_server().await;
    let mut manager = ConnectionManager::new(TungsteniteConnector::default());

    manager.connect(&url);
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    wait_for_status(&mut manager, ConnectionStatus::Disconnected).await;
    assert!(manager.last_error().is_none());

    let answered = tokio::time::timeout(WAIT, replies.recv())
        .await
        .expect("timed out waiting for the server")
        .expect("server dropped its report");
    assert!(answered, "client did not complete the closing handshake");
}

#[tokio::test]
async fn refused_connection_errors_then_disconnects() {
    // Grab a free port, then release it so nothing is listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let mut manager = ConnectionManager::new(TungsteniteConnector::default());
    manager.connect(&format!("ws://{addr}/ws"));

    wait_for_status(&mut manager, ConnectionStatus::Error).await;
    wait_for_status(&mut manager, ConnectionStatus::Disconnected).await;
    assert!(manager.last_error().is_some());
}

#[tokio::test]
async fn malformed_url_is_sustained_error() {
    let mut manager = ConnectionManager::new(TungsteniteConnector::default());
    manager.connect("not a url");

    assert_eq!(manager.status(), ConnectionStatus::Error);
    assert_eq!(manager.drain_events(), 0);
    assert_eq!(manager.status(), ConnectionStatus::Error);
}

#[tokio::test]
async fn reconnect_replaces_live_connection() {
    let url = spawn_echo_server().await;
    let mut manager = ConnectionManager::new(TungsteniteConnector::default());

    manager.connect(&url);
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    let first = manager.active_id();

    manager.connect(&url);
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    assert_ne!(manager.active_id(), first);

    // The old socket's close is discarded, so the new one stays up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.drain_events();
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(manager.send("still here"), Outcome::Applied);
}
