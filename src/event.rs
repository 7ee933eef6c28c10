//! portal.interaction.v1 event schema
//!
//! A small, versioned schema for recorded interaction streams. Embedders
//! and the replay tooling feed sessions from NDJSON scripts of these
//! events, one event per line, timestamps in epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Current event schema version
pub const EVENT_SCHEMA_VERSION: &str = "portal.interaction.v1";

fn default_schema_version() -> String {
    EVENT_SCHEMA_VERSION.to_string()
}

/// One recorded interaction event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Schema version; defaults to the current version when omitted
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Event timestamp, epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: InputEventKind,
}

/// Event payload, tagged by `event`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InputEventKind {
    PointerMove { x: f64, y: f64 },
    KeyDown,
    Focus,
    Paste,
    /// Mirror a value into the concealed trap field
    HoneypotFill { value: String },
    /// Credential submission (credential-gated flow)
    Submit { username: String, password: String },
    /// End of session
    Teardown,
}

impl InputEvent {
    /// Validate one event against the schema
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.schema_version != EVENT_SCHEMA_VERSION {
            return Err(VerifyError::InvalidEvent(format!(
                "unsupported schema version: {}",
                self.schema_version
            )));
        }
        if let InputEventKind::PointerMove { x, y } = self.kind {
            if !x.is_finite() || !y.is_finite() {
                return Err(VerifyError::InvalidEvent(
                    "pointer coordinates must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Parse newline-delimited JSON events, one per line
pub fn parse_ndjson(input: &str) -> Result<Vec<InputEvent>, VerifyError> {
    let mut events = Vec::new();
    for (line_number, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: InputEvent = serde_json::from_str(trimmed).map_err(|e| {
            VerifyError::ParseError(format!("line {}: {}", line_number + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Parse a JSON array of events
pub fn parse_array(input: &str) -> Result<Vec<InputEvent>, VerifyError> {
    serde_json::from_str(input)
        .map_err(|e| VerifyError::ParseError(format!("event array: {e}")))
}

/// A validation failure for one event in a script
#[derive(Debug, Clone, Serialize)]
pub struct EventIssue {
    pub index: usize,
    pub error: String,
}

/// Validate a whole script; returns one issue per failing event
pub fn validate_events(events: &[InputEvent]) -> Vec<EventIssue> {
    let mut issues: Vec<EventIssue> = events
        .iter()
        .enumerate()
        .filter_map(|(index, event)| {
            event.validate().err().map(|e| EventIssue {
                index,
                error: e.to_string(),
            })
        })
        .collect();

    // Out-of-order timestamps break virtual-time replay.
    for (index, pair) in events.windows(2).enumerate() {
        if pair[1].time < pair[0].time {
            issues.push(EventIssue {
                index: index + 1,
                error: "timestamp earlier than preceding event".to_string(),
            });
        }
    }
    issues
}
