//! Core types for the Trapgate verification engine
//!
//! This module defines the data that flows through the engine: raw pointer
//! samples, derived motion points, the session status, and the tagged
//! payload union each verification phase composes for the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded pointer position. Immutable once created.
///
/// `time` crosses the wire as epoch milliseconds, matching what the scoring
/// service expects in `mouse_data`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
}

impl PointerSample {
    pub fn new(x: f64, y: f64, time: DateTime<Utc>) -> Self {
        Self { x, y, time }
    }
}

/// One derived visualization datum: pixel displacement since the previous
/// sample, at the moment the sample arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionPoint {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub magnitude: u32,
}

/// One human-readable status feed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry timestamp; feed entries written outside an event handler carry none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub message: String,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            time: None,
            message: message.into(),
        }
    }

    pub fn at(time: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            time: Some(time),
            message: message.into(),
        }
    }
}

/// Externally observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Analyzing,
    Human,
    Bot,
    LoggedIn,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Analyzing => "analyzing",
            Status::Human => "human",
            Status::Bot => "bot",
            Status::LoggedIn => "logged_in",
        }
    }
}

/// Request body for the deep scan endpoint (`/predict`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepScanPayload {
    pub mouse_data: Vec<PointerSample>,
    /// Successive keydown intervals in milliseconds
    pub typing_speed: Vec<i64>,
    pub honeypot_field: String,
}

/// Request body for the passive validation endpoint (`/validate`)
///
/// Carries aggregate counts only, never the raw sample arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassivePayload {
    pub username: String,
    pub mouse_movements: u64,
    pub focus_events: u64,
    pub clipboard_actions: u64,
    pub form_autofill_patterns: bool,
    pub honeypot_field: String,
    pub honeypot_clicked: bool,
}

/// Request body for the login endpoint (`/login`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub username: String,
    pub password: String,
}

/// Tagged union of everything a verification phase can put on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationPayload {
    Passive(PassivePayload),
    Credentials(CredentialPayload),
    DeepScan(DeepScanPayload),
}

/// Scan endpoint response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub is_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body carried by non-2xx validate/login responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMessage {
    pub message: String,
}

/// Body carried by a 2xx login response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: String,
}

/// Scan endpoint verdict, with the rejection reason surfaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Human,
    Bot { reason: String },
}

impl From<ScanResponse> for ScanVerdict {
    fn from(response: ScanResponse) -> Self {
        if response.is_human {
            ScanVerdict::Human
        } else {
            ScanVerdict::Bot {
                reason: response
                    .reason
                    .unwrap_or_else(|| "Unspecified".to_string()),
            }
        }
    }
}

/// Passive validation outcome. Rejection is an expected verdict, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateOutcome {
    Accepted,
    Rejected { message: String },
}

/// Login outcome. Rejection is an expected verdict, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted { user: String },
    Rejected { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pointer_sample_wire_format() {
        let sample = PointerSample::new(
            120.0,
            48.5,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        );
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["x"], 120.0);
        assert_eq!(json["y"], 48.5);
        assert_eq!(json["time"], 1_700_000_000_000i64);

        let parsed: PointerSample = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sample);
    }

    #[test]
    fn test_deep_scan_payload_wire_fields() {
        let payload = DeepScanPayload {
            mouse_data: vec![PointerSample::new(
                1.0,
                2.0,
                Utc.timestamp_millis_opt(1_000).unwrap(),
            )],
            typing_speed: vec![120, 95],
            honeypot_field: String::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["mouse_data"].is_array());
        assert_eq!(json["typing_speed"], serde_json::json!([120, 95]));
        assert_eq!(json["honeypot_field"], "");
    }

    #[test]
    fn test_passive_payload_wire_fields() {
        let payload = PassivePayload {
            username: "resident".to_string(),
            mouse_movements: 42,
            focus_events: 3,
            clipboard_actions: 1,
            form_autofill_patterns: false,
            honeypot_field: String::new(),
            honeypot_clicked: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["mouse_movements"], 42);
        assert_eq!(json["focus_events"], 3);
        assert_eq!(json["clipboard_actions"], 1);
        assert_eq!(json["form_autofill_patterns"], false);
        assert_eq!(json["honeypot_clicked"], false);
    }

    #[test]
    fn test_scan_verdict_from_response() {
        let verdict: ScanVerdict = ScanResponse {
            is_human: false,
            reason: Some("Abnormal behavior patterns".to_string()),
        }
        .into();
        assert_eq!(
            verdict,
            ScanVerdict::Bot {
                reason: "Abnormal behavior patterns".to_string()
            }
        );

        let verdict: ScanVerdict = ScanResponse {
            is_human: true,
            reason: None,
        }
        .into();
        assert_eq!(verdict, ScanVerdict::Human);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::LoggedIn).unwrap();
        assert_eq!(json, "\"logged_in\"");
        assert_eq!(Status::Analyzing.as_str(), "analyzing");
    }

    #[test]
    fn test_payload_union_tags() {
        let payload = VerificationPayload::Credentials(CredentialPayload {
            username: "resident".to_string(),
            password: "secret".to_string(),
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "credentials");
        assert_eq!(json["username"], "resident");
    }
}
