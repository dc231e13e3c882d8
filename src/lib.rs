//! wsprobe: WebSocket testing client core.
//!
//! ARCHITECTURE
//! ============
//! Projects bind a name to one WebSocket endpoint; signals are reusable
//! payloads scoped to a project. `AppState` is the single explicit container
//! that owns the domain store, the connection manager, and the persistence
//! gateway. Collaborators (the CLI in `main.rs`, tests) hold it by value and
//! call into it; nothing here is process-global.
//!
//! Transport callbacks are modelled as typed events on one channel, so the
//! connection state machine can be driven by a fake transport in tests.

pub mod config;
pub mod services;
pub mod session;
pub mod state;
pub mod transcript;
pub mod transport;
pub mod validation;

pub use services::Outcome;
pub use services::connection::{ConnectionManager, ConnectionStatus};
pub use services::persistence::{FileStorage, MemoryStorage, PersistenceGateway, StorageBackend};
pub use services::store::DomainStore;
pub use state::{AppState, NewProject, NewSignal, Project, ProjectPatch, Signal, SignalPatch, StoreSnapshot};
pub use transcript::{Direction, Transcript, TranscriptEntry};

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error output.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}
