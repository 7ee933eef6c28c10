//! Verification state machine
//!
//! The verifier owns all session state and sequences the verification
//! protocol, but performs no IO itself: interaction events, timer expiry,
//! and service replies come in through handler methods; timer scheduling
//! and endpoint dispatch go out as [`Command`]s for a driver to execute.
//! This keeps every transition, guard, and ordering quirk directly
//! observable in tests.
//!
//! Guards carried by the machine:
//! - a per-phase single-flight lock (one in-flight request per phase, a
//!   second attempt is dropped silently),
//! - a single-shot guard on the auto trigger (at most one automatic scan
//!   per session),
//! - a teardown guard (replies arriving after [`Verifier::teardown`] are
//!   discarded instead of mutating a dead session).
//!
//! Cross-phase completion ordering is deliberately NOT enforced: replies
//! are applied in arrival order, exactly as the portal behaves.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::InteractionCapture;
use crate::config::{FlowPolicy, SessionConfig};
use crate::features::MotionTrace;
use crate::honeypot::HoneypotSensor;
use crate::logfeed::LogFeed;
use crate::types::{
    CredentialPayload, DeepScanPayload, LoginOutcome, PassivePayload, ScanVerdict, Status,
    ValidateOutcome, VerificationPayload,
};
use crate::error::VerifyError;

/// Identifies one dispatched request; the reply must echo it back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(pub u64);

/// Verification phase a request belongs to. Each phase holds its own
/// single-flight lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Aggregate-count check against `/validate`
    Passive,
    /// Credential submission against `/login`
    Login,
    /// Raw-sample scan against `/predict` (auto-triggered or post-login)
    DeepScan,
}

/// Instruction for the driver executing this session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Cancel any pending trigger timer and start a fresh one
    ScheduleTrigger { delay_ms: u64 },
    /// Cancel the pending trigger timer without rescheduling
    CancelTrigger,
    /// Issue one request to the risk service
    Dispatch {
        token: RequestToken,
        phase: Phase,
        payload: VerificationPayload,
    },
}

/// A completed service call, delivered back to the machine
#[derive(Debug)]
pub enum PhaseReply {
    Scan(Result<ScanVerdict, VerifyError>),
    Validate(Result<ValidateOutcome, VerifyError>),
    Login(Result<LoginOutcome, VerifyError>),
}

/// The verification state machine for one portal session
pub struct Verifier {
    session_id: Uuid,
    config: SessionConfig,
    capture: InteractionCapture,
    honeypot: HoneypotSensor,
    feed: LogFeed,
    status: Status,
    next_token: u64,
    inflight_passive: Option<RequestToken>,
    inflight_login: Option<RequestToken>,
    inflight_scan: Option<RequestToken>,
    auto_trigger_spent: bool,
    credentials: Option<CredentialPayload>,
    torn_down: bool,
}

impl Verifier {
    /// Create a session with the given config and an injected honeypot handle
    pub fn new(config: SessionConfig, honeypot: HoneypotSensor) -> Self {
        let mut feed = LogFeed::new(config.log_cap);
        feed.note("System initialized");
        feed.note("Waiting for input");

        Self {
            session_id: Uuid::new_v4(),
            capture: InteractionCapture::new(config.sample_capacity, config.trace_window),
            honeypot,
            feed,
            status: Status::Idle,
            next_token: 0,
            inflight_passive: None,
            inflight_login: None,
            inflight_scan: None,
            auto_trigger_spent: false,
            credentials: None,
            torn_down: false,
            config,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn feed(&self) -> &LogFeed {
        &self.feed
    }

    pub fn capture(&self) -> &InteractionCapture {
        &self.capture
    }

    pub fn motion_trace(&self) -> &MotionTrace {
        self.capture.trace()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Record a pointer move. In the auto-scan flow each captured sample
    /// cancels and reschedules the trigger timer; dropped (post-freeze)
    /// moves do not touch the timer.
    pub fn handle_pointer_move(&mut self, x: f64, y: f64, now: DateTime<Utc>) -> Vec<Command> {
        if self.torn_down {
            return Vec::new();
        }

        let captured = self.capture.on_pointer_move(x, y, now);

        if self.config.flow == FlowPolicy::AutoScan && captured && !self.auto_trigger_spent {
            return vec![Command::ScheduleTrigger {
                delay_ms: self.config.quiet_period_ms,
            }];
        }
        Vec::new()
    }

    /// Record a keydown for typing-interval derivation
    pub fn handle_key_down(&mut self, now: DateTime<Utc>) {
        if self.torn_down {
            return;
        }
        self.capture.on_key_down(now);
    }

    /// Record a focus change
    pub fn handle_focus(&mut self, now: DateTime<Utc>) {
        if self.torn_down {
            return;
        }
        let count = self.capture.on_focus();
        self.feed.note_at(now, format!("Focus shift recorded ({count})"));
    }

    /// Record a clipboard paste
    pub fn handle_paste(&mut self, now: DateTime<Utc>) {
        if self.torn_down {
            return;
        }
        let count = self.capture.on_paste();
        self.feed
            .note_at(now, format!("Clipboard paste recorded ({count})"));
    }

    /// The quiet-period timer elapsed. Fires the automatic deep scan when
    /// enough samples have accumulated; firing below the threshold is a
    /// no-op that leaves the single-shot guard unspent.
    pub fn handle_trigger_elapsed(&mut self, now: DateTime<Utc>) -> Vec<Command> {
        if self.torn_down || self.config.flow != FlowPolicy::AutoScan {
            return Vec::new();
        }
        if self.auto_trigger_spent {
            debug!("session {}: auto trigger already spent", self.session_id);
            return Vec::new();
        }
        if self.capture.sample_count() <= self.config.trigger_threshold {
            debug!(
                "session {}: trigger elapsed below threshold ({} samples)",
                self.session_id,
                self.capture.sample_count()
            );
            return Vec::new();
        }
        if self.inflight_scan.is_some() {
            return Vec::new();
        }

        self.auto_trigger_spent = true;
        self.transition(Status::Analyzing);
        self.feed.note_at(now, "Analyzing patterns...");

        let token = self.issue_token();
        self.inflight_scan = Some(token);
        vec![Command::Dispatch {
            token,
            phase: Phase::DeepScan,
            payload: VerificationPayload::DeepScan(self.compose_deep_scan()),
        }]
    }

    /// Submit credentials (credential-gated flow). Empty username or
    /// password refuses locally: no transition, no network call.
    pub fn submit(&mut self, username: &str, password: &str, now: DateTime<Utc>) -> Vec<Command> {
        if self.torn_down {
            return Vec::new();
        }
        if self.config.flow != FlowPolicy::CredentialGated {
            debug!(
                "session {}: submit ignored under auto-scan flow",
                self.session_id
            );
            return Vec::new();
        }
        if self.status != Status::Idle {
            debug!(
                "session {}: submit dropped in status {:?}",
                self.session_id, self.status
            );
            return Vec::new();
        }
        if username.is_empty() || password.is_empty() {
            self.feed
                .note_at(now, "Username and password are required");
            return Vec::new();
        }
        if self.inflight_passive.is_some() {
            return Vec::new();
        }

        self.credentials = Some(CredentialPayload {
            username: username.to_string(),
            password: password.to_string(),
        });
        self.transition(Status::Analyzing);
        self.feed.note_at(now, "Analyzing patterns...");

        let token = self.issue_token();
        self.inflight_passive = Some(token);
        vec![Command::Dispatch {
            token,
            phase: Phase::Passive,
            payload: VerificationPayload::Passive(self.compose_passive(username)),
        }]
    }

    /// Apply a completed service call. Replies from a torn-down session or
    /// with a token that no phase is waiting on are discarded.
    pub fn handle_reply(
        &mut self,
        token: RequestToken,
        reply: PhaseReply,
        now: DateTime<Utc>,
    ) -> Vec<Command> {
        if self.torn_down {
            debug!(
                "session {}: discarding reply {:?} after teardown",
                self.session_id, token
            );
            return Vec::new();
        }

        match reply {
            PhaseReply::Validate(result) => self.apply_validate(token, result, now),
            PhaseReply::Login(result) => self.apply_login(token, result, now),
            PhaseReply::Scan(result) => self.apply_scan(token, result, now),
        }
    }

    /// End the session. Cancels the pending trigger timer; in-flight
    /// requests are left to complete and their replies will be discarded.
    pub fn teardown(&mut self) -> Vec<Command> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;
        info!("session {}: torn down", self.session_id);
        vec![Command::CancelTrigger]
    }

    fn apply_validate(
        &mut self,
        token: RequestToken,
        result: Result<ValidateOutcome, VerifyError>,
        now: DateTime<Utc>,
    ) -> Vec<Command> {
        if self.inflight_passive != Some(token) {
            debug!("session {}: stale passive reply {:?}", self.session_id, token);
            return Vec::new();
        }
        self.inflight_passive = None;

        match result {
            Err(err) => {
                warn!("session {}: passive check failed: {err}", self.session_id);
                self.feed.note_at(now, "Connection failed");
                self.transition(Status::Idle);
                Vec::new()
            }
            Ok(ValidateOutcome::Rejected { message }) => {
                self.transition(Status::Bot);
                self.feed.note_at(now, format!("Blocked: {message}"));
                Vec::new()
            }
            Ok(ValidateOutcome::Accepted) => {
                self.feed.note_at(now, "Passive check passed");
                let Some(credentials) = self.credentials.clone() else {
                    warn!(
                        "session {}: passive check passed without stored credentials",
                        self.session_id
                    );
                    self.transition(Status::Idle);
                    return Vec::new();
                };
                if self.inflight_login.is_some() {
                    return Vec::new();
                }
                let token = self.issue_token();
                self.inflight_login = Some(token);
                vec![Command::Dispatch {
                    token,
                    phase: Phase::Login,
                    payload: VerificationPayload::Credentials(credentials),
                }]
            }
        }
    }

    fn apply_login(
        &mut self,
        token: RequestToken,
        result: Result<LoginOutcome, VerifyError>,
        now: DateTime<Utc>,
    ) -> Vec<Command> {
        if self.inflight_login != Some(token) {
            debug!("session {}: stale login reply {:?}", self.session_id, token);
            return Vec::new();
        }
        self.inflight_login = None;

        match result {
            Err(err) => {
                warn!("session {}: login call failed: {err}", self.session_id);
                self.feed.note_at(now, "Connection failed");
                self.transition(Status::Idle);
                Vec::new()
            }
            Ok(LoginOutcome::Rejected { message }) => {
                self.feed.note_at(now, format!("Login failed: {message}"));
                self.transition(Status::Idle);
                Vec::new()
            }
            Ok(LoginOutcome::Accepted { user }) => {
                self.transition(Status::LoggedIn);
                self.feed.note_at(now, format!("Login successful: {user}"));
                if self.inflight_scan.is_some() {
                    return Vec::new();
                }
                let token = self.issue_token();
                self.inflight_scan = Some(token);
                vec![Command::Dispatch {
                    token,
                    phase: Phase::DeepScan,
                    payload: VerificationPayload::DeepScan(self.compose_deep_scan()),
                }]
            }
        }
    }

    fn apply_scan(
        &mut self,
        token: RequestToken,
        result: Result<ScanVerdict, VerifyError>,
        now: DateTime<Utc>,
    ) -> Vec<Command> {
        if self.inflight_scan != Some(token) {
            debug!("session {}: stale scan reply {:?}", self.session_id, token);
            return Vec::new();
        }
        self.inflight_scan = None;

        match result {
            Err(err) => {
                // Log-only: no retry, no status change in either flow.
                warn!("session {}: scan call failed: {err}", self.session_id);
                self.feed.note_at(now, "Connection failed");
            }
            Ok(ScanVerdict::Bot { reason }) => {
                self.transition(Status::Bot);
                self.feed.note_at(now, format!("Blocked: {reason}"));
            }
            Ok(ScanVerdict::Human) => {
                if self.status == Status::LoggedIn {
                    self.feed.note_at(now, "Deep scan passed");
                } else {
                    self.transition(Status::Human);
                    self.feed.note_at(now, "User verified as human");
                }
            }
        }
        Vec::new()
    }

    /// Deep scan payload: every captured raw sample, typing intervals, and
    /// the honeypot read at this instant
    fn compose_deep_scan(&self) -> DeepScanPayload {
        DeepScanPayload {
            mouse_data: self.capture.samples().to_vec(),
            typing_speed: self.capture.typing_intervals(),
            honeypot_field: self.honeypot.read().value,
        }
    }

    /// Passive payload: aggregate counts only, never raw arrays
    fn compose_passive(&self, username: &str) -> PassivePayload {
        let read = self.honeypot.read();
        PassivePayload {
            username: username.to_string(),
            mouse_movements: self.capture.pointer_event_count(),
            focus_events: self.capture.focus_count(),
            clipboard_actions: self.capture.clipboard_count(),
            form_autofill_patterns: self.capture.autofill_suspected(),
            honeypot_field: read.value,
            honeypot_clicked: read.clicked,
        }
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }

    fn transition(&mut self, next: Status) {
        if self.status != next {
            info!(
                "session {}: {} -> {}",
                self.session_id,
                self.status.as_str(),
                next.as_str()
            );
            self.status = next;
        }
    }
}
