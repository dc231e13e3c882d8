//! Input rules applied by collaborators before values reach the core.
//!
//! The store accepts whatever it is given; these checks live at the edge,
//! where user input is collected. Every accepted value is trimmed.

use tracing::warn;
use uuid::Uuid;

use crate::state::{NewProject, NewSignal, ProjectPatch, SignalPatch};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("websocket url must start with ws:// or wss://: {0}")]
    Scheme(String),
}

impl crate::ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Required(_) => "E_REQUIRED",
            Self::Scheme(_) => "E_URL_SCHEME",
        }
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(trimmed.to_owned())
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

/// Trimmed endpoint URL with a `ws://` or `wss://` scheme.
///
/// # Errors
///
/// `Required` for a blank value, `Scheme` for any other scheme.
pub fn websocket_url(value: &str) -> Result<String, ValidationError> {
    let url = required("websocket url", value)?;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ValidationError::Scheme(url));
    }
    Ok(url)
}

fn payload(value: &str) -> Result<String, ValidationError> {
    let payload = required("payload", value)?;
    if payload_format(&payload) == PayloadFormat::Text {
        warn!("validation: payload is not valid JSON; saving as plain text");
    }
    Ok(payload)
}

// =============================================================================
// PROJECTS
// =============================================================================

/// # Errors
///
/// Returns an error for a blank name or a URL without a `ws://`/`wss://` scheme.
pub fn validate_project(name: &str, description: Option<&str>, url: &str) -> Result<NewProject, ValidationError> {
    Ok(NewProject { name: required("name", name)?, description: optional(description), websocket_url: websocket_url(url)? })
}

/// Validate only the supplied fields. A blank description clears it.
///
/// # Errors
///
/// Same rules as [`validate_project`], per supplied field.
pub fn validate_project_patch(
    name: Option<&str>,
    description: Option<&str>,
    url: Option<&str>,
) -> Result<ProjectPatch, ValidationError> {
    Ok(ProjectPatch {
        name: name.map(|n| required("name", n)).transpose()?,
        description: description.map(|d| optional(Some(d))),
        websocket_url: url.map(websocket_url).transpose()?,
    })
}

// =============================================================================
// SIGNALS
// =============================================================================

/// Payloads that are not JSON are accepted with a warning.
///
/// # Errors
///
/// Returns an error for a blank name or a blank payload.
pub fn validate_signal(
    project_id: Uuid,
    name: &str,
    description: Option<&str>,
    payload_text: &str,
) -> Result<NewSignal, ValidationError> {
    Ok(NewSignal {
        project_id,
        name: required("name", name)?,
        description: optional(description),
        payload: payload(payload_text)?,
    })
}

/// # Errors
///
/// Same rules as [`validate_signal`], per supplied field.
pub fn validate_signal_patch(
    name: Option<&str>,
    description: Option<&str>,
    payload_text: Option<&str>,
) -> Result<SignalPatch, ValidationError> {
    Ok(SignalPatch {
        project_id: None,
        name: name.map(|n| required("name", n)).transpose()?,
        description: description.map(|d| optional(Some(d))),
        payload: payload_text.map(payload).transpose()?,
    })
}

// =============================================================================
// PAYLOADS AND DRAFTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Text,
}

#[must_use]
pub fn payload_format(payload: &str) -> PayloadFormat {
    if serde_json::from_str::<serde_json::Value>(payload).is_ok() {
        PayloadFormat::Json
    } else {
        PayloadFormat::Text
    }
}

/// Whitespace-only drafts are never sent. Sendable drafts go out untrimmed.
#[must_use]
pub fn is_sendable_draft(draft: &str) -> bool {
    !draft.trim().is_empty()
}

/// Browser link for a socket endpoint: `ws://` -> `http://`,
/// `wss://` -> `https://`. Other input is returned unchanged.
#[must_use]
pub fn browser_url(ws_url: &str) -> String {
    if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_owned()
    }
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
