use super::*;
use crate::Outcome;
use crate::services::connection::ConnectionManager;
use crate::transport::test_helpers::FakeConnector;

const ECHO_URL: &str = "wss://echo.example/socket";

// =============================================================================
// parse_line
// =============================================================================

#[test]
fn plain_line_is_text() {
    assert_eq!(parse_line("{\"ping\":1}"), SessionInput::Text("{\"ping\":1}"));
}

#[test]
fn slash_line_is_command() {
    assert_eq!(parse_line("/status"), SessionInput::Command { name: "status", arg: "" });
    assert_eq!(parse_line("/signal  ping "), SessionInput::Command { name: "signal", arg: "ping" });
}

#[test]
fn double_slash_sends_single_slash() {
    assert_eq!(parse_line("//ping"), SessionInput::Text("/ping"));
    assert_eq!(parse_line("///"), SessionInput::Text("//"));
}

#[test]
fn bare_slash_is_empty_command() {
    assert_eq!(parse_line("/"), SessionInput::Command { name: "", arg: "" });
}

#[test]
fn leading_space_is_text() {
    assert_eq!(parse_line(" /quit"), SessionInput::Text(" /quit"));
}

// =============================================================================
// InputQueue
// =============================================================================

#[test]
fn held_while_connecting_then_sent_in_order() {
    let fake = FakeConnector::new();
    let mut mgr = ConnectionManager::new(fake.clone());
    let mut queue = InputQueue::new();

    mgr.connect(ECHO_URL);
    queue.push("one".into());
    queue.push("two".into());
    assert_eq!(queue.next_ready(mgr.status()), None);
    assert_eq!(queue.len(), 2);

    fake.accept(fake.last_id());
    mgr.drain_events();
    while let Some(line) = queue.next_ready(mgr.status()) {
        assert_eq!(mgr.send(&line), Outcome::Applied);
    }

    assert!(queue.is_empty());
    assert_eq!(fake.sent(fake.last_id()), vec!["one".to_owned(), "two".to_owned()]);
}

#[test]
fn released_after_failed_connect() {
    let fake = FakeConnector::new();
    let mut mgr = ConnectionManager::new(fake.clone());
    let mut queue = InputQueue::new();

    mgr.connect(ECHO_URL);
    queue.push("hello".into());
    fake.fail(fake.last_id(), "refused");
    mgr.drain_events();

    assert_eq!(mgr.status(), ConnectionStatus::Error);
    assert_eq!(queue.next_ready(mgr.status()).as_deref(), Some("hello"));
}

#[test]
fn replay_pauses_when_connecting_again() {
    let mut queue = InputQueue::new();
    queue.push("/connect".into());
    queue.push("after".into());

    assert_eq!(queue.next_ready(ConnectionStatus::Connected).as_deref(), Some("/connect"));
    assert_eq!(queue.next_ready(ConnectionStatus::Connecting), None);
    assert_eq!(queue.next_ready(ConnectionStatus::Connected).as_deref(), Some("after"));
}

#[test]
fn idle_connection_releases_immediately() {
    let mut queue = InputQueue::new();
    queue.push("x".into());
    assert_eq!(queue.next_ready(ConnectionStatus::Disconnected).as_deref(), Some("x"));
    assert_eq!(queue.next_ready(ConnectionStatus::Disconnected), None);
}
