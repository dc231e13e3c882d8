//! Core services used by the application container.
//!
//! ARCHITECTURE
//! ============
//! `store` owns projects and signals, `connection` owns the socket and the
//! transcript, `persistence` moves store snapshots to and from durable
//! storage. Services never call each other; `AppState` wires them together.

pub mod connection;
pub mod persistence;
pub mod store;

/// Result of an operation that can be a legitimate no-op.
///
/// Callers and tests can tell "nothing happened because the target was
/// missing" apart from "nothing happened because the socket was not ready".
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation took effect.
    Applied,
    /// No record matched the given id; nothing changed.
    NotFound,
    /// The connection was not open for writing; nothing was sent or recorded.
    NotConnected,
}

impl Outcome {
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}
