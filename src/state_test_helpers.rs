//! Fixtures for `AppState` tests.

use super::*;
use crate::services::persistence::MemoryStorage;
use crate::transport::test_helpers::FakeConnector;

pub const TEST_KEY: &str = "test-storage";

pub type TestState = AppState<FakeConnector, MemoryStorage>;

/// Empty state over a fake connector and in-memory storage. The returned
/// handles share their internals with the state.
#[must_use]
pub fn test_app_state() -> (TestState, FakeConnector, MemoryStorage) {
    test_app_state_with(MemoryStorage::new())
}

/// State loaded from a pre-populated storage.
#[must_use]
pub fn test_app_state_with(storage: MemoryStorage) -> (TestState, FakeConnector, MemoryStorage) {
    let fake = FakeConnector::new();
    let gateway = PersistenceGateway::new(storage.clone(), TEST_KEY);
    let state = AppState::load(fake.clone(), gateway).expect("memory storage should load");
    (state, fake, storage)
}

#[must_use]
pub fn echo_project() -> NewProject {
    NewProject::new("Echo", None, "wss://echo.example/socket")
}

#[must_use]
pub fn ping_signal(project_id: Uuid) -> NewSignal {
    NewSignal::new(project_id, "ping", None, "{\"ping\":1}")
}
