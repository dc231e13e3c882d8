//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is the one explicit container for everything the client
//! holds: the domain store, the connection manager, and the persistence
//! gateway. It is built once by `AppState::load` and passed by `&mut` to
//! whichever layer needs it. There is no ambient global.
//!
//! Every project/signal mutation that takes effect marks the container
//! dirty and flushes a snapshot straight away. Selection, connection state,
//! and the transcript never reach storage.
//!
//! ERROR HANDLING
//! ==============
//! A failed write keeps the dirty flag so the next mutation retries it, and
//! is logged at error level. In-memory state is never rolled back.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::Outcome;
use crate::services::connection::ConnectionManager;
use crate::services::persistence::{PersistenceError, PersistenceGateway, StorageBackend};
use crate::services::store::DomainStore;
use crate::transport::Connector;

// =============================================================================
// PROJECT
// =============================================================================

/// A named WebSocket endpoint the user tests against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub websocket_url: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for a new project. Ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub websocket_url: String,
}

impl NewProject {
    #[must_use]
    pub fn new(name: impl Into<String>, description: Option<String>, websocket_url: impl Into<String>) -> Self {
        Self { name: name.into(), description, websocket_url: websocket_url.into() }
    }
}

/// Partial project update. `None` leaves a field alone; `description:
/// Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub websocket_url: Option<String>,
}

impl ProjectPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.websocket_url.is_none()
    }
}

// =============================================================================
// SIGNAL
// =============================================================================

/// A named, reusable message payload scoped to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub payload: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSignal {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub payload: String,
}

impl NewSignal {
    #[must_use]
    pub fn new(project_id: Uuid, name: impl Into<String>, description: Option<String>, payload: impl Into<String>) -> Self {
        Self { project_id, name: name.into(), description, payload: payload.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalPatch {
    pub project_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub payload: Option<String>,
}

impl SignalPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.project_id.is_none() && self.name.is_none() && self.description.is_none() && self.payload.is_none()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The persisted record: projects and signals, nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub signals: Vec<Signal>,
}

// =============================================================================
// APP STATE
// =============================================================================

pub struct AppState<C, S> {
    store: DomainStore,
    connection: ConnectionManager<C>,
    persistence: PersistenceGateway<S>,
    /// Store changed since the last successful write.
    dirty: bool,
}

impl<C: Connector, S: StorageBackend> AppState<C, S> {
    /// Build the container from whatever is persisted. An absent record
    /// yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn load(connector: C, persistence: PersistenceGateway<S>) -> Result<Self, PersistenceError> {
        let snapshot = persistence.load()?;
        info!(
            projects = snapshot.projects.len(),
            signals = snapshot.signals.len(),
            key = persistence.key(),
            "state: loaded"
        );
        Ok(Self {
            store: DomainStore::from_snapshot(snapshot),
            connection: ConnectionManager::new(connector),
            persistence,
            dirty: false,
        })
    }

    #[must_use]
    pub fn store(&self) -> &DomainStore {
        &self.store
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// Mutable access for event pumping (`drain_events`, `next_event`).
    pub fn connection_mut(&mut self) -> &mut ConnectionManager<C> {
        &mut self.connection
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Write the current snapshot if anything changed since the last
    /// successful write.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the dirty flag stays set.
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }
        self.persistence.save(&self.store.snapshot())?;
        self.dirty = false;
        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        if let Err(e) = self.flush() {
            error!(error = %e, key = self.persistence.key(), "state: persist failed; will retry on next change");
        }
    }

    fn track(&mut self, outcome: Outcome) -> Outcome {
        if outcome.is_applied() {
            self.mark_dirty();
        }
        outcome
    }

    // =========================================================================
    // PROJECTS
    // =========================================================================

    pub fn add_project(&mut self, input: NewProject) -> Project {
        let project = self.store.add_project(input);
        self.mark_dirty();
        project
    }

    pub fn update_project(&mut self, id: Uuid, patch: ProjectPatch) -> Outcome {
        let outcome = self.store.update_project(id, patch);
        self.track(outcome)
    }

    pub fn delete_project(&mut self, id: Uuid) -> Outcome {
        let outcome = self.store.delete_project(id);
        self.track(outcome)
    }

    /// Change the selection without touching the connection.
    pub fn set_current_project(&mut self, id: Option<Uuid>) -> Outcome {
        self.store.set_current_project(id)
    }

    /// Select a project and connect to its endpoint.
    pub fn select_project(&mut self, id: Uuid) -> Outcome {
        match self.store.set_current_project(Some(id)) {
            Outcome::Applied => self.connect_current(),
            other => other,
        }
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    pub fn add_signal(&mut self, input: NewSignal) -> Signal {
        let signal = self.store.add_signal(input);
        self.mark_dirty();
        signal
    }

    pub fn update_signal(&mut self, id: Uuid, patch: SignalPatch) -> Outcome {
        let outcome = self.store.update_signal(id, patch);
        self.track(outcome)
    }

    pub fn delete_signal(&mut self, id: Uuid) -> Outcome {
        let outcome = self.store.delete_signal(id);
        self.track(outcome)
    }

    /// Payload of a signal in the current project, for loading into a draft.
    #[must_use]
    pub fn signal_payload(&self, id: Uuid) -> Option<String> {
        self.current_signal(id).map(|s| s.payload.clone())
    }

    fn current_signal(&self, id: Uuid) -> Option<&Signal> {
        let current = self.store.current_project()?.id;
        self.store.signal(id).filter(|s| s.project_id == current)
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    /// Connect to the current project's endpoint.
    pub fn connect_current(&mut self) -> Outcome {
        let Some(url) = self.store.current_project().map(|p| p.websocket_url.clone()) else {
            return Outcome::NotFound;
        };
        self.connection.connect(&url);
        Outcome::Applied
    }

    /// Connect to an endpoint outside the store; the selection is kept.
    pub fn connect(&mut self, url: &str) {
        self.connection.connect(url);
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    pub fn send(&mut self, content: &str) -> Outcome {
        self.connection.send(content)
    }

    /// Send a stored signal's payload verbatim.
    pub fn send_signal(&mut self, id: Uuid) -> Outcome {
        let Some(payload) = self.signal_payload(id) else {
            return Outcome::NotFound;
        };
        self.connection.send(&payload)
    }

    pub fn clear_transcript(&mut self) {
        self.connection.clear();
    }

    /// Remove the stored record and start over from an empty store. The
    /// connection is dropped and the transcript emptied.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be removed; in-memory state
    /// is left untouched in that case.
    pub fn clear_all_data(&mut self) -> Result<(), PersistenceError> {
        self.persistence.clear()?;
        self.store = DomainStore::new();
        self.dirty = false;
        self.connection.disconnect();
        self.connection.clear();
        warn!(key = self.persistence.key(), "state: all data cleared");
        Ok(())
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_test_helpers.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
