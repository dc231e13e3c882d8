//! Transcript: the ordered log of text frames crossing the active connection.
//!
//! DESIGN
//! ======
//! Entries are appended in the order the single control flow observes them,
//! so sent and received frames interleave by arrival, not by request/response
//! pairing. Content is stored exactly as transmitted; the display helpers at
//! the bottom of this module only format copies.
//!
//! The transcript is transient: it is owned by the connection manager and is
//! never written to durable storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// Which way a frame crossed the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub direction: Direction,
    /// Raw payload, byte-for-byte as sent or received.
    pub content: String,
    /// Milliseconds since Unix epoch at capture time.
    pub timestamp: i64,
}

impl TranscriptEntry {
    pub fn sent(content: impl Into<String>) -> Self {
        Self::capture(Direction::Sent, content.into())
    }

    pub fn received(content: impl Into<String>) -> Self {
        Self::capture(Direction::Received, content.into())
    }

    fn capture(direction: Direction, content: String) -> Self {
        Self { id: Uuid::new_v4(), direction, content, timestamp: crate::now_ms() }
    }
}

// =============================================================================
// TRANSCRIPT
// =============================================================================

/// Append-only log; `clear` is the only operation that shrinks it.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Entries appended after the first `seen` ones. Used by renderers that
    /// print incrementally; returns everything if the log was cleared since.
    #[must_use]
    pub fn since(&self, seen: usize) -> &[TranscriptEntry] {
        self.entries.get(seen..).unwrap_or(&self.entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// =============================================================================
// DISPLAY
// =============================================================================

/// Pretty-print JSON content; anything else is returned unchanged.
#[must_use]
pub fn render_content(content: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return content.to_owned();
    };
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| content.to_owned())
}

/// Render a millisecond timestamp as `HH:MM:SS` (UTC).
#[must_use]
pub fn format_clock(timestamp_ms: i64) -> String {
    const UNKNOWN: &str = "--:--:--";

    let nanos = i128::from(timestamp_ms) * 1_000_000;
    let Ok(at) = OffsetDateTime::from_unix_timestamp_nanos(nanos) else {
        return UNKNOWN.to_owned();
    };
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| UNKNOWN.to_owned())
}

#[cfg(test)]
#[path = "transcript_test.rs"]
mod tests;
