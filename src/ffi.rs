//! FFI bindings for Trapgate
//!
//! C-compatible functions for embedding the verification engine in a host
//! UI written in another language. Events come in as JSON strings; the
//! commands the machine emits (timer scheduling, endpoint dispatch) go
//! back out as JSON arrays for the host to execute, and completed calls
//! are returned through `trapgate_session_reply`. All returned strings are
//! allocated and must be freed with `trapgate_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::VerifyError;
use crate::event::{InputEvent, InputEventKind};
use crate::honeypot::{HoneypotSensor, SharedHoneypotField};
use crate::types::{
    LogEntry, LoginOutcome, MotionPoint, ScanVerdict, Status, ValidateOutcome,
};
use crate::verifier::{Command, Phase, PhaseReply, RequestToken, Verifier};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Opaque handle to one verification session
pub struct TrapgateSessionHandle {
    verifier: Verifier,
    honeypot: SharedHoneypotField,
}

/// A completed service call, as the host reports it back
#[derive(Deserialize)]
struct FfiReply {
    token: u64,
    phase: Phase,
    /// Transport failure message; when set, the call failed before a verdict
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    is_human: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    accepted: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

impl FfiReply {
    fn into_phase_reply(self) -> Result<(RequestToken, PhaseReply), VerifyError> {
        let token = RequestToken(self.token);

        if let Some(error) = self.error {
            let failure = VerifyError::Transport(error);
            let reply = match self.phase {
                Phase::DeepScan => PhaseReply::Scan(Err(failure)),
                Phase::Passive => PhaseReply::Validate(Err(failure)),
                Phase::Login => PhaseReply::Login(Err(failure)),
            };
            return Ok((token, reply));
        }

        let reply = match self.phase {
            Phase::DeepScan => {
                let is_human = self
                    .is_human
                    .ok_or_else(|| VerifyError::MissingField("is_human".to_string()))?;
                let verdict = if is_human {
                    ScanVerdict::Human
                } else {
                    ScanVerdict::Bot {
                        reason: self.reason.unwrap_or_else(|| "Unspecified".to_string()),
                    }
                };
                PhaseReply::Scan(Ok(verdict))
            }
            Phase::Passive => {
                let accepted = self
                    .accepted
                    .ok_or_else(|| VerifyError::MissingField("accepted".to_string()))?;
                let outcome = if accepted {
                    ValidateOutcome::Accepted
                } else {
                    ValidateOutcome::Rejected {
                        message: self.message.unwrap_or_else(|| "Rejected".to_string()),
                    }
                };
                PhaseReply::Validate(Ok(outcome))
            }
            Phase::Login => {
                let accepted = self
                    .accepted
                    .ok_or_else(|| VerifyError::MissingField("accepted".to_string()))?;
                let outcome = if accepted {
                    LoginOutcome::Accepted {
                        user: self
                            .user
                            .ok_or_else(|| VerifyError::MissingField("user".to_string()))?,
                    }
                } else {
                    LoginOutcome::Rejected {
                        message: self.message.unwrap_or_else(|| "Rejected".to_string()),
                    }
                };
                PhaseReply::Login(Ok(outcome))
            }
        };
        Ok((token, reply))
    }
}

/// Observable session state for the host UI
#[derive(Serialize)]
struct SessionSnapshot<'a> {
    session_id: String,
    status: Status,
    torn_down: bool,
    sample_count: usize,
    pointer_events: u64,
    focus_events: u64,
    clipboard_actions: u64,
    feed: Vec<&'a LogEntry>,
    motion_trace: Vec<&'a MotionPoint>,
}

fn commands_to_json(commands: &[Command]) -> Result<String, VerifyError> {
    Ok(serde_json::to_string(commands)?)
}

/// Create a new verification session.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string holding a
///   session config, or NULL for the default config.
/// - Returns a pointer that must be freed with `trapgate_session_free`.
/// - Returns NULL on error; call `trapgate_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn trapgate_session_new(
    config_json: *const c_char,
) -> *mut TrapgateSessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        SessionConfig::default()
    } else {
        let Some(json) = cstr_to_string(config_json) else {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        };
        match serde_json::from_str::<SessionConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    if let Err(e) = config.validate() {
        set_last_error(&e.to_string());
        return ptr::null_mut();
    }

    let honeypot = SharedHoneypotField::new();
    let verifier = Verifier::new(config, HoneypotSensor::new(Box::new(honeypot.clone())));
    Box::into_raw(Box::new(TrapgateSessionHandle { verifier, honeypot }))
}

/// Free a verification session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `trapgate_session_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn trapgate_session_free(session: *mut TrapgateSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Apply one interaction event (portal.interaction.v1 JSON) and return the
/// emitted commands as a JSON array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `trapgate_session_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with
///   `trapgate_free_string`; NULL on error.
#[no_mangle]
pub unsafe extern "C" fn trapgate_session_apply(
    session: *mut TrapgateSessionHandle,
    event_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;

    let Some(json) = cstr_to_string(event_json) else {
        set_last_error("Invalid event string pointer");
        return ptr::null_mut();
    };

    let event: InputEvent = match serde_json::from_str(&json) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };
    if let Err(e) = event.validate() {
        set_last_error(&e.to_string());
        return ptr::null_mut();
    }

    let time = event.time;
    let commands = match event.kind {
        InputEventKind::PointerMove { x, y } => handle.verifier.handle_pointer_move(x, y, time),
        InputEventKind::KeyDown => {
            handle.verifier.handle_key_down(time);
            Vec::new()
        }
        InputEventKind::Focus => {
            handle.verifier.handle_focus(time);
            Vec::new()
        }
        InputEventKind::Paste => {
            handle.verifier.handle_paste(time);
            Vec::new()
        }
        InputEventKind::HoneypotFill { value } => {
            handle.honeypot.set_value(value);
            Vec::new()
        }
        InputEventKind::Submit { username, password } => {
            handle.verifier.submit(&username, &password, time)
        }
        InputEventKind::Teardown => handle.verifier.teardown(),
    };

    match commands_to_json(&commands) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Report one completed service call and return follow-up commands as a
/// JSON array.
///
/// The reply JSON carries `token`, `phase`, and either `error` (transport
/// failure) or the verdict fields for that phase (`is_human`/`reason`,
/// `accepted`/`message`, `accepted`/`user`).
///
/// # Safety
/// - `session` must be a valid pointer returned by `trapgate_session_new`.
/// - `reply_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with
///   `trapgate_free_string`; NULL on error.
#[no_mangle]
pub unsafe extern "C" fn trapgate_session_reply(
    session: *mut TrapgateSessionHandle,
    reply_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;

    let Some(json) = cstr_to_string(reply_json) else {
        set_last_error("Invalid reply string pointer");
        return ptr::null_mut();
    };

    let reply: FfiReply = match serde_json::from_str(&json) {
        Ok(reply) => reply,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let (token, reply) = match reply.into_phase_reply() {
        Ok(pair) => pair,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let commands = handle.verifier.handle_reply(token, reply, chrono::Utc::now());
    match commands_to_json(&commands) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Snapshot the observable session state as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `trapgate_session_new`.
/// - Returns a newly allocated string that must be freed with
///   `trapgate_free_string`; NULL on error.
#[no_mangle]
pub unsafe extern "C" fn trapgate_session_snapshot(
    session: *mut TrapgateSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*session;
    let verifier = &handle.verifier;
    let capture = verifier.capture();

    let snapshot = SessionSnapshot {
        session_id: verifier.session_id().to_string(),
        status: verifier.status(),
        torn_down: verifier.is_torn_down(),
        sample_count: capture.sample_count(),
        pointer_events: capture.pointer_event_count(),
        focus_events: capture.focus_count(),
        clipboard_actions: capture.clipboard_count(),
        feed: verifier.feed().iter().collect(),
        motion_trace: verifier.motion_trace().iter().collect(),
    };

    match serde_json::to_string(&snapshot) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by Trapgate functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Trapgate function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn trapgate_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Trapgate call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn trapgate_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Trapgate library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn trapgate_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn apply(session: *mut TrapgateSessionHandle, event: &str) -> String {
        let event = CString::new(event).unwrap();
        unsafe {
            let result = trapgate_session_apply(session, event.as_ptr());
            assert!(!result.is_null(), "apply failed: {:?}", last_error());
            let json = CStr::from_ptr(result).to_str().unwrap().to_string();
            trapgate_free_string(result);
            json
        }
    }

    fn last_error() -> Option<String> {
        unsafe {
            let err = trapgate_last_error();
            if err.is_null() {
                None
            } else {
                Some(CStr::from_ptr(err).to_str().unwrap().to_string())
            }
        }
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let session = trapgate_session_new(ptr::null());
            assert!(!session.is_null());

            let commands = apply(
                session,
                r#"{"event": "pointer_move", "x": 10.0, "y": 20.0, "time": 1000}"#,
            );
            // Credential-gated default: pointer moves emit no commands.
            assert_eq!(commands, "[]");

            let snapshot_ptr = trapgate_session_snapshot(session);
            assert!(!snapshot_ptr.is_null());
            let snapshot: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(snapshot_ptr).to_str().unwrap()).unwrap();
            assert_eq!(snapshot["status"], "idle");
            assert_eq!(snapshot["sample_count"], 1);
            trapgate_free_string(snapshot_ptr);

            trapgate_session_free(session);
        }
    }

    #[test]
    fn test_ffi_submit_and_reply_roundtrip() {
        unsafe {
            let config = CString::new(
                serde_json::to_string(&SessionConfig::credential_gated()).unwrap(),
            )
            .unwrap();
            let session = trapgate_session_new(config.as_ptr());
            assert!(!session.is_null());

            let commands = apply(
                session,
                r#"{"event": "submit", "username": "resident", "password": "secret", "time": 500}"#,
            );
            let parsed: serde_json::Value = serde_json::from_str(&commands).unwrap();
            assert_eq!(parsed[0]["command"], "dispatch");
            assert_eq!(parsed[0]["phase"], "passive");
            let token = parsed[0]["token"].as_u64().unwrap();

            let reply = CString::new(format!(
                r#"{{"token": {token}, "phase": "passive", "accepted": false, "message": "Access Denied"}}"#
            ))
            .unwrap();
            let follow_ups = trapgate_session_reply(session, reply.as_ptr());
            assert!(!follow_ups.is_null());
            trapgate_free_string(follow_ups);

            let snapshot_ptr = trapgate_session_snapshot(session);
            let snapshot: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(snapshot_ptr).to_str().unwrap()).unwrap();
            assert_eq!(snapshot["status"], "bot");
            trapgate_free_string(snapshot_ptr);

            trapgate_session_free(session);
        }
    }

    #[test]
    fn test_ffi_invalid_event_sets_error() {
        unsafe {
            let session = trapgate_session_new(ptr::null());
            let event = CString::new("not json").unwrap();
            let result = trapgate_session_apply(session, event.as_ptr());
            assert!(result.is_null());
            assert!(last_error().is_some());
            trapgate_session_free(session);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = trapgate_version();
            assert!(!version.is_null());
            assert!(!CStr::from_ptr(version).to_str().unwrap().is_empty());
        }
    }
}
