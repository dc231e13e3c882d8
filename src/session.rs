//! Interactive session input: line parsing and the hold-back queue.
//!
//! DESIGN
//! ======
//! A line starting with `/` is a command; `//` escapes a leading slash, so
//! `//ping` sends `/ping`. Lines read while the connection is still
//! `Connecting` are held and replayed in order once it settles, which lets
//! piped input reach a socket that was not yet open when it was read.
//! Replay stops again as soon as a replayed line sends the connection back
//! to `Connecting`.

use std::collections::VecDeque;

use crate::services::connection::ConnectionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput<'a> {
    /// Sent verbatim.
    Text(&'a str),
    /// `/name arg`; `arg` is trimmed and may be empty.
    Command { name: &'a str, arg: &'a str },
}

#[must_use]
pub fn parse_line(line: &str) -> SessionInput<'_> {
    let Some(command) = line.strip_prefix('/') else {
        return SessionInput::Text(line);
    };
    if command.starts_with('/') {
        return SessionInput::Text(command);
    }
    let (name, arg) = command.split_once(' ').map_or((command, ""), |(n, a)| (n, a.trim()));
    SessionInput::Command { name: name.trim(), arg }
}

/// Lines waiting for the connection to leave `Connecting`.
#[derive(Debug, Default)]
pub struct InputQueue {
    lines: VecDeque<String>,
}

impl InputQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
    }

    /// The oldest held line, unless the connection is still `Connecting`.
    pub fn next_ready(&mut self, status: ConnectionStatus) -> Option<String> {
        if status == ConnectionStatus::Connecting {
            return None;
        }
        self.lines.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
