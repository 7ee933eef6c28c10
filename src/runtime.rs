//! Session drivers
//!
//! Two ways to execute [`Verifier`] commands against a [`RiskClient`]:
//!
//! - [`PortalDriver`] runs live on a tokio runtime: the debounce timer is a
//!   real abortable task, endpoint calls run on spawned tasks, and their
//!   completions are applied in arrival order — deliberately not request
//!   order.
//! - [`ScriptReplay`] replays a recorded event script in virtual time:
//!   the trigger deadline is computed from event timestamps and endpoint
//!   calls are awaited inline, which makes a replay deterministic and
//!   instant regardless of the recorded gaps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::event::{InputEvent, InputEventKind};
use crate::honeypot::{HoneypotSensor, SharedHoneypotField};
use crate::service::RiskClient;
use crate::types::{Status, VerificationPayload};
use crate::verifier::{Command, PhaseReply, RequestToken, Verifier};

enum DriverSignal {
    TriggerElapsed,
    Reply(RequestToken, PhaseReply),
}

/// Live driver for one portal session
pub struct PortalDriver {
    verifier: Verifier,
    honeypot: SharedHoneypotField,
    client: Arc<dyn RiskClient>,
    signal_tx: mpsc::UnboundedSender<DriverSignal>,
    signal_rx: mpsc::UnboundedReceiver<DriverSignal>,
    trigger_timer: Option<JoinHandle<()>>,
    inflight: usize,
}

impl PortalDriver {
    /// Build a session around a fresh in-memory honeypot field
    pub fn new(config: SessionConfig, client: Arc<dyn RiskClient>) -> Self {
        let honeypot = SharedHoneypotField::new();
        let verifier = Verifier::new(config, HoneypotSensor::new(Box::new(honeypot.clone())));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            verifier,
            honeypot,
            client,
            signal_tx,
            signal_rx,
            trigger_timer: None,
            inflight: 0,
        }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn status(&self) -> Status {
        self.verifier.status()
    }

    /// Feed one interaction event and execute the commands it causes
    pub fn feed(&mut self, event: InputEvent) {
        let time = event.time;
        let commands = match event.kind {
            InputEventKind::PointerMove { x, y } => {
                self.verifier.handle_pointer_move(x, y, time)
            }
            InputEventKind::KeyDown => {
                self.verifier.handle_key_down(time);
                Vec::new()
            }
            InputEventKind::Focus => {
                self.verifier.handle_focus(time);
                Vec::new()
            }
            InputEventKind::Paste => {
                self.verifier.handle_paste(time);
                Vec::new()
            }
            InputEventKind::HoneypotFill { value } => {
                self.honeypot.set_value(value);
                Vec::new()
            }
            InputEventKind::Submit { username, password } => {
                self.verifier.submit(&username, &password, time)
            }
            InputEventKind::Teardown => self.verifier.teardown(),
        };
        self.execute(commands);
    }

    /// Replay a recorded script in real time, honoring the recorded gaps.
    /// Timer expiry and endpoint completions are processed while waiting.
    pub async fn run_script(&mut self, events: Vec<InputEvent>) -> Status {
        let mut previous: Option<DateTime<Utc>> = None;
        for event in events {
            if let Some(previous) = previous {
                let gap = (event.time - previous).num_milliseconds().max(0) as u64;
                self.wait(Duration::from_millis(gap)).await;
            }
            previous = Some(event.time);
            self.feed(event);
        }
        self.run_until_settled().await;
        self.status()
    }

    /// Process signals until no timer is pending and nothing is in flight
    pub async fn run_until_settled(&mut self) {
        while self.trigger_timer.is_some() || self.inflight > 0 {
            let signal = self.signal_rx.recv().await;
            match signal {
                Some(signal) => self.apply_signal(signal),
                None => break,
            }
        }
    }

    async fn wait(&mut self, duration: Duration) {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let signal = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                signal = self.signal_rx.recv() => signal,
            };
            match signal {
                Some(signal) => self.apply_signal(signal),
                None => return,
            }
        }
    }

    fn apply_signal(&mut self, signal: DriverSignal) {
        let now = Utc::now();
        let commands = match signal {
            DriverSignal::TriggerElapsed => {
                self.trigger_timer = None;
                self.verifier.handle_trigger_elapsed(now)
            }
            DriverSignal::Reply(token, reply) => {
                self.inflight = self.inflight.saturating_sub(1);
                self.verifier.handle_reply(token, reply, now)
            }
        };
        self.execute(commands);
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::ScheduleTrigger { delay_ms } => {
                    // Cancel-and-reschedule: at most one pending timer.
                    if let Some(handle) = self.trigger_timer.take() {
                        handle.abort();
                    }
                    let tx = self.signal_tx.clone();
                    self.trigger_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        let _ = tx.send(DriverSignal::TriggerElapsed);
                    }));
                }
                Command::CancelTrigger => {
                    if let Some(handle) = self.trigger_timer.take() {
                        handle.abort();
                    }
                }
                Command::Dispatch { token, phase, payload } => {
                    debug!("dispatching {phase:?} request {token:?}");
                    let client = self.client.clone();
                    let tx = self.signal_tx.clone();
                    self.inflight += 1;
                    tokio::spawn(async move {
                        let reply = match payload {
                            VerificationPayload::DeepScan(payload) => {
                                PhaseReply::Scan(client.scan(payload).await)
                            }
                            VerificationPayload::Passive(payload) => {
                                PhaseReply::Validate(client.validate(payload).await)
                            }
                            VerificationPayload::Credentials(payload) => {
                                PhaseReply::Login(client.login(payload).await)
                            }
                        };
                        let _ = tx.send(DriverSignal::Reply(token, reply));
                    });
                }
            }
        }
    }
}

/// One observed status change during a replay
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransitionRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub status: Status,
}

/// Virtual-time replay of a recorded event script.
///
/// The trigger deadline is tracked from event timestamps: it fires between
/// two events when the quiet period elapses, or after the last event.
/// Endpoint calls are awaited inline, so completions apply in request
/// order — a deliberate simplification that keeps replays deterministic.
pub struct ScriptReplay {
    verifier: Verifier,
    honeypot: SharedHoneypotField,
    client: Arc<dyn RiskClient>,
    deadline: Option<DateTime<Utc>>,
    transitions: Vec<TransitionRecord>,
}

impl ScriptReplay {
    pub fn new(config: SessionConfig, client: Arc<dyn RiskClient>) -> Self {
        let honeypot = SharedHoneypotField::new();
        let verifier = Verifier::new(config, HoneypotSensor::new(Box::new(honeypot.clone())));
        Self {
            verifier,
            honeypot,
            client,
            deadline: None,
            transitions: Vec::new(),
        }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn status(&self) -> Status {
        self.verifier.status()
    }

    /// Status changes observed so far, in order
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Replay a whole script and return the final status
    pub async fn run(&mut self, events: Vec<InputEvent>) -> Status {
        for event in events {
            // Fire the armed trigger if its deadline falls before this event.
            if let Some(deadline) = self.deadline {
                if deadline <= event.time {
                    self.deadline = None;
                    let commands = self.verifier.handle_trigger_elapsed(deadline);
                    self.execute(commands, deadline).await;
                }
            }
            self.apply(event).await;
        }

        // End of script counts as silence: a still-armed trigger fires.
        if let Some(deadline) = self.deadline.take() {
            let commands = self.verifier.handle_trigger_elapsed(deadline);
            self.execute(commands, deadline).await;
        }
        self.status()
    }

    async fn apply(&mut self, event: InputEvent) {
        let time = event.time;
        let commands = match event.kind {
            InputEventKind::PointerMove { x, y } => {
                self.verifier.handle_pointer_move(x, y, time)
            }
            InputEventKind::KeyDown => {
                self.verifier.handle_key_down(time);
                Vec::new()
            }
            InputEventKind::Focus => {
                self.verifier.handle_focus(time);
                Vec::new()
            }
            InputEventKind::Paste => {
                self.verifier.handle_paste(time);
                Vec::new()
            }
            InputEventKind::HoneypotFill { value } => {
                self.honeypot.set_value(value);
                Vec::new()
            }
            InputEventKind::Submit { username, password } => {
                self.verifier.submit(&username, &password, time)
            }
            InputEventKind::Teardown => self.verifier.teardown(),
        };
        self.execute(commands, time).await;
    }

    async fn execute(&mut self, commands: Vec<Command>, now: DateTime<Utc>) {
        // The event handler itself may have transitioned before emitting
        // any command.
        self.note_status(now);

        let mut queue = commands;
        while !queue.is_empty() {
            let mut follow_ups = Vec::new();
            for command in queue {
                match command {
                    Command::ScheduleTrigger { delay_ms } => {
                        self.deadline =
                            Some(now + chrono::Duration::milliseconds(delay_ms as i64));
                    }
                    Command::CancelTrigger => {
                        self.deadline = None;
                    }
                    Command::Dispatch { token, payload, .. } => {
                        let reply = match payload {
                            VerificationPayload::DeepScan(payload) => {
                                PhaseReply::Scan(self.client.scan(payload).await)
                            }
                            VerificationPayload::Passive(payload) => {
                                PhaseReply::Validate(self.client.validate(payload).await)
                            }
                            VerificationPayload::Credentials(payload) => {
                                PhaseReply::Login(self.client.login(payload).await)
                            }
                        };
                        follow_ups.extend(self.verifier.handle_reply(token, reply, now));
                        self.note_status(now);
                    }
                }
            }
            queue = follow_ups;
        }
    }

    fn last_recorded(&self) -> Status {
        self.transitions
            .last()
            .map(|t| t.status)
            .unwrap_or(Status::Idle)
    }

    fn note_status(&mut self, time: DateTime<Utc>) {
        let current = self.verifier.status();
        if self.last_recorded() != current {
            self.transitions.push(TransitionRecord {
                time,
                status: current,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;
    use crate::event::parse_ndjson;
    use crate::service::{ScriptedRiskClient, SimulatedRiskClient};
    use crate::types::ScanVerdict;

    fn move_script(count: usize, start_ms: i64, step_ms: i64) -> String {
        (0..count)
            .map(|i| {
                format!(
                    r#"{{"event": "pointer_move", "x": {}, "y": {}, "time": {}}}"#,
                    i * 5,
                    i * 2,
                    start_ms + i as i64 * step_ms
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_replay_auto_scan_fires_after_quiet_period() {
        let client = Arc::new(ScriptedRiskClient::new());
        client.seed_scan(Ok(ScanVerdict::Human));

        let mut replay = ScriptReplay::new(SessionConfig::auto_scan(), client);
        let events = parse_ndjson(&move_script(11, 0, 100)).unwrap();
        let status = replay.run(events).await;

        assert_eq!(status, Status::Human);
        let statuses: Vec<Status> = replay.transitions().iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![Status::Analyzing, Status::Human]);

        // The scan fired at 1000 + 2500, virtual time.
        assert_eq!(
            replay.transitions()[0].time.timestamp_millis(),
            3_500
        );
    }

    #[tokio::test]
    async fn test_replay_trigger_resets_on_later_events() {
        let client = Arc::new(ScriptedRiskClient::new());
        client.seed_scan(Ok(ScanVerdict::Human));

        let mut replay = ScriptReplay::new(SessionConfig::auto_scan(), client);
        // 11 early moves, then one more at 3000 ms — inside the pending
        // quiet period, so the deadline moves to 5500.
        let mut script = move_script(11, 0, 100);
        script.push('\n');
        script.push_str(r#"{"event": "pointer_move", "x": 90, "y": 90, "time": 3000}"#);

        let events = parse_ndjson(&script).unwrap();
        replay.run(events).await;

        assert_eq!(
            replay.transitions()[0].time.timestamp_millis(),
            5_500
        );
    }

    #[tokio::test]
    async fn test_replay_credential_flow_against_simulated_service() {
        let client = Arc::new(SimulatedRiskClient::new("resident", "secret"));
        let mut replay = ScriptReplay::new(SessionConfig::credential_gated(), client);

        let script = format!(
            "{}\n{}\n{}",
            move_script(6, 0, 100),
            r#"{"event": "key_down", "time": 700}"#,
            r#"{"event": "submit", "username": "resident", "password": "secret", "time": 900}"#,
        );
        let status = replay.run(parse_ndjson(&script).unwrap()).await;

        // Passive check, login, and post-login scan all pass.
        assert_eq!(status, Status::LoggedIn);
    }

    #[tokio::test]
    async fn test_replay_honeypot_fill_blocks_at_validate() {
        let client = Arc::new(SimulatedRiskClient::new("resident", "secret"));
        let mut replay = ScriptReplay::new(SessionConfig::credential_gated(), client);

        let script = [
            r#"{"event": "honeypot_fill", "value": "I am a bot", "time": 100}"#,
            r#"{"event": "submit", "username": "bot_user_99", "password": "x", "time": 200}"#,
        ]
        .join("\n");
        let status = replay.run(parse_ndjson(&script).unwrap()).await;

        assert_eq!(status, Status::Bot);
        assert_eq!(
            replay.verifier().feed().latest().unwrap().message,
            "Blocked: Access Denied"
        );
    }

    #[tokio::test]
    async fn test_replay_teardown_cancels_pending_trigger() {
        let client = Arc::new(ScriptedRiskClient::new());
        let mut replay = ScriptReplay::new(SessionConfig::auto_scan(), client);

        let mut script = move_script(11, 0, 100);
        script.push('\n');
        script.push_str(r#"{"event": "teardown", "time": 1200}"#);

        let status = replay.run(parse_ndjson(&script).unwrap()).await;
        // The trigger never fires: no scripted reply was consumed and the
        // session ends idle.
        assert_eq!(status, Status::Idle);
        assert!(replay.transitions().is_empty());
    }

    #[tokio::test]
    async fn test_live_driver_settles_after_transport_failure() {
        let client = Arc::new(ScriptedRiskClient::new());
        client.seed_validate(Err(VerifyError::Transport("unreachable".to_string())));

        let mut driver = PortalDriver::new(SessionConfig::credential_gated(), client);
        let events = parse_ndjson(
            r#"{"event": "submit", "username": "resident", "password": "secret", "time": 0}"#,
        )
        .unwrap();

        let status = driver.run_script(events).await;
        assert_eq!(status, Status::Idle);
        assert_eq!(
            driver.verifier().feed().latest().unwrap().message,
            "Connection failed"
        );
    }

    #[tokio::test]
    async fn test_live_driver_full_flow() {
        let client = Arc::new(SimulatedRiskClient::new("resident", "secret"));
        let mut driver = PortalDriver::new(SessionConfig::credential_gated(), client);

        let script = [
            r#"{"event": "pointer_move", "x": 5, "y": 5, "time": 0}"#,
            r#"{"event": "key_down", "time": 20}"#,
            r#"{"event": "submit", "username": "resident", "password": "secret", "time": 40}"#,
        ]
        .join("\n");

        let status = driver.run_script(parse_ndjson(&script).unwrap()).await;
        assert_eq!(status, Status::LoggedIn);
    }
}
