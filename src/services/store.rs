//! Domain store: CRUD for projects and signals plus the current-project
//! reference.
//!
//! DESIGN
//! ======
//! Everything here is in-memory and synchronous. The current project is held
//! as an id, never a copy, so an update to the current project is visible
//! through `current_project()` without extra bookkeeping, and deleting it
//! clears the reference in the same call.
//!
//! No input validation happens at this layer; see `crate::validation` for the
//! rules collaborators apply before calling in. Signals are not checked
//! against projects on insert: a signal whose project is gone is inert
//! because every read path filters by project.

use tracing::{debug, info};
use uuid::Uuid;

use super::Outcome;
use crate::state::{NewProject, NewSignal, Project, ProjectPatch, Signal, SignalPatch, StoreSnapshot};

#[derive(Debug, Clone, Default)]
pub struct DomainStore {
    projects: Vec<Project>,
    signals: Vec<Signal>,
    current: Option<Uuid>,
}

impl DomainStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records. Selection is not persisted, so no
    /// project is current afterwards.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self { projects: snapshot.projects, signals: snapshot.signals, current: None }
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot { projects: self.projects.clone(), signals: self.signals.clone() }
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    #[must_use]
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    #[must_use]
    pub fn project(&self, id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn signal(&self, id: Uuid) -> Option<&Signal> {
        self.signals.iter().find(|s| s.id == id)
    }

    /// Resolve a project by id string or exact name. Ids win over names.
    #[must_use]
    pub fn find_project(&self, reference: &str) -> Option<&Project> {
        if let Ok(id) = Uuid::parse_str(reference) {
            if let Some(project) = self.project(id) {
                return Some(project);
            }
        }
        self.projects.iter().find(|p| p.name == reference)
    }

    /// Resolve a signal of `project_id` by id string or exact name.
    #[must_use]
    pub fn find_signal(&self, project_id: Uuid, reference: &str) -> Option<&Signal> {
        if let Ok(id) = Uuid::parse_str(reference) {
            if let Some(signal) = self.signal(id).filter(|s| s.project_id == project_id) {
                return Some(signal);
            }
        }
        self.signals_for(project_id).find(|s| s.name == reference)
    }

    pub fn signals_for(&self, project_id: Uuid) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(move |s| s.project_id == project_id)
    }

    #[must_use]
    pub fn current_project(&self) -> Option<&Project> {
        self.current.and_then(|id| self.project(id))
    }

    /// Signals of the current project; empty when nothing is selected.
    #[must_use]
    pub fn current_signals(&self) -> Vec<&Signal> {
        match self.current {
            Some(id) => self.signals_for(id).collect(),
            None => Vec::new(),
        }
    }

    // =========================================================================
    // PROJECTS
    // =========================================================================

    /// Append a project. The first project in an empty store becomes current.
    pub fn add_project(&mut self, input: NewProject) -> Project {
        let now = crate::now_ms();
        let project = Project {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            websocket_url: input.websocket_url,
            created_at: now,
            updated_at: now,
        };

        if self.projects.is_empty() {
            self.current = Some(project.id);
        }
        self.projects.push(project.clone());

        info!(project_id = %project.id, name = %project.name, "store: project added");
        project
    }

    pub fn update_project(&mut self, id: Uuid, patch: ProjectPatch) -> Outcome {
        let Some(project) = self.projects.iter_mut().find(|p| p.id == id) else {
            debug!(project_id = %id, "store: update_project on unknown id");
            return Outcome::NotFound;
        };

        if let Some(name) = patch.name {
            project.name = name;
        }
        if let Some(description) = patch.description {
            project.description = description;
        }
        if let Some(url) = patch.websocket_url {
            project.websocket_url = url;
        }
        project.updated_at = crate::now_ms();

        debug!(project_id = %id, "store: project updated");
        Outcome::Applied
    }

    /// Remove a project and every signal that references it.
    pub fn delete_project(&mut self, id: Uuid) -> Outcome {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        if self.projects.len() == before {
            debug!(project_id = %id, "store: delete_project on unknown id");
            return Outcome::NotFound;
        }

        if self.current == Some(id) {
            self.current = None;
        }

        let signals_before = self.signals.len();
        self.signals.retain(|s| s.project_id != id);
        let cascaded = signals_before - self.signals.len();

        info!(project_id = %id, cascaded, "store: project deleted");
        Outcome::Applied
    }

    /// Select a project. `None` clears the selection; an unknown id also
    /// clears it and reports `NotFound`.
    pub fn set_current_project(&mut self, id: Option<Uuid>) -> Outcome {
        let Some(id) = id else {
            self.current = None;
            return Outcome::Applied;
        };

        if self.project(id).is_some() {
            self.current = Some(id);
            Outcome::Applied
        } else {
            self.current = None;
            Outcome::NotFound
        }
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    pub fn add_signal(&mut self, input: NewSignal) -> Signal {
        let now = crate::now_ms();
        let signal = Signal {
            id: Uuid::new_v4(),
            project_id: input.project_id,
            name: input.name,
            description: input.description,
            payload: input.payload,
            created_at: now,
            updated_at: now,
        };
        self.signals.push(signal.clone());

        info!(signal_id = %signal.id, project_id = %signal.project_id, name = %signal.name, "store: signal added");
        signal
    }

    pub fn update_signal(&mut self, id: Uuid, patch: SignalPatch) -> Outcome {
        let Some(signal) = self.signals.iter_mut().find(|s| s.id == id) else {
            debug!(signal_id = %id, "store: update_signal on unknown id");
            return Outcome::NotFound;
        };

        if let Some(project_id) = patch.project_id {
            signal.project_id = project_id;
        }
        if let Some(name) = patch.name {
            signal.name = name;
        }
        if let Some(description) = patch.description {
            signal.description = description;
        }
        if let Some(payload) = patch.payload {
            signal.payload = payload;
        }
        signal.updated_at = crate::now_ms();

        debug!(signal_id = %id, "store: signal updated");
        Outcome::Applied
    }

    pub fn delete_signal(&mut self, id: Uuid) -> Outcome {
        let before = self.signals.len();
        self.signals.retain(|s| s.id != id);
        if self.signals.len() == before {
            debug!(signal_id = %id, "store: delete_signal on unknown id");
            return Outcome::NotFound;
        }
        info!(signal_id = %id, "store: signal deleted");
        Outcome::Applied
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
