//! Risk service boundary
//!
//! The remote risk-scoring/authentication service is an external
//! collaborator: this module defines the client side of its three
//! endpoints and nothing of its scoring internals. All calls are a single
//! attempt — no retries, no backoff, no auth headers. Transport failures
//! surface as [`VerifyError::Transport`]; well-formed rejections are
//! ordinary verdicts carried in the outcome types.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::error::VerifyError;
use crate::types::{
    CredentialPayload, DeepScanPayload, LoginOutcome, PassivePayload, ScanVerdict,
    ValidateOutcome,
};

/// Deep scan endpoint path
pub const SCAN_PATH: &str = "/predict";

/// Passive validation endpoint path
pub const VALIDATE_PATH: &str = "/validate";

/// Login endpoint path
pub const LOGIN_PATH: &str = "/login";

/// Future returned by client calls
pub type ServiceFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, VerifyError>> + Send + 'static>>;

/// Client side of the risk service contract.
///
/// Implementations take owned payloads so a driver can dispatch the call on
/// a spawned task without borrowing session state.
pub trait RiskClient: Send + Sync {
    /// POST the deep scan payload to `/predict`
    fn scan(&self, payload: DeepScanPayload) -> ServiceFuture<ScanVerdict>;

    /// POST the passive payload to `/validate`
    fn validate(&self, payload: PassivePayload) -> ServiceFuture<ValidateOutcome>;

    /// POST the credential payload to `/login`
    fn login(&self, payload: CredentialPayload) -> ServiceFuture<LoginOutcome>;
}

/// HTTP client against a live risk service
#[cfg(feature = "http")]
pub struct HttpRiskClient {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpRiskClient {
    /// Client for a service rooted at `base_url` (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(feature = "http")]
impl RiskClient for HttpRiskClient {
    fn scan(&self, payload: DeepScanPayload) -> ServiceFuture<ScanVerdict> {
        let client = self.client.clone();
        let url = self.url(SCAN_PATH);
        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| VerifyError::Transport(e.to_string()))?;

            // The scan endpoint carries its verdict in the body on every
            // status, including the rejection status.
            let body: crate::types::ScanResponse = response
                .json()
                .await
                .map_err(|e| VerifyError::Transport(e.to_string()))?;
            Ok(body.into())
        })
    }

    fn validate(&self, payload: PassivePayload) -> ServiceFuture<ValidateOutcome> {
        let client = self.client.clone();
        let url = self.url(VALIDATE_PATH);
        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| VerifyError::Transport(e.to_string()))?;

            if response.status().is_success() {
                Ok(ValidateOutcome::Accepted)
            } else {
                let body: crate::types::ServiceMessage = response
                    .json()
                    .await
                    .map_err(|e| VerifyError::Transport(e.to_string()))?;
                Ok(ValidateOutcome::Rejected {
                    message: body.message,
                })
            }
        })
    }

    fn login(&self, payload: CredentialPayload) -> ServiceFuture<LoginOutcome> {
        let client = self.client.clone();
        let url = self.url(LOGIN_PATH);
        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| VerifyError::Transport(e.to_string()))?;

            if response.status().is_success() {
                let body: crate::types::LoginResponse = response
                    .json()
                    .await
                    .map_err(|e| VerifyError::Transport(e.to_string()))?;
                Ok(LoginOutcome::Accepted { user: body.user })
            } else {
                let body: crate::types::ServiceMessage = response
                    .json()
                    .await
                    .map_err(|e| VerifyError::Transport(e.to_string()))?;
                Ok(LoginOutcome::Rejected {
                    message: body.message,
                })
            }
        })
    }
}

/// Client that replays pre-seeded outcomes, in seed order per endpoint.
///
/// Used by replay tooling and tests. An exhausted queue yields a transport
/// error, which the engine treats like any other connection failure.
#[derive(Default)]
pub struct ScriptedRiskClient {
    scans: Mutex<VecDeque<Result<ScanVerdict, VerifyError>>>,
    validations: Mutex<VecDeque<Result<ValidateOutcome, VerifyError>>>,
    logins: Mutex<VecDeque<Result<LoginOutcome, VerifyError>>>,
}

impl ScriptedRiskClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_scan(&self, reply: Result<ScanVerdict, VerifyError>) {
        lock(&self.scans).push_back(reply);
    }

    pub fn seed_validate(&self, reply: Result<ValidateOutcome, VerifyError>) {
        lock(&self.validations).push_back(reply);
    }

    pub fn seed_login(&self, reply: Result<LoginOutcome, VerifyError>) {
        lock(&self.logins).push_back(reply);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn pop<T>(queue: &Mutex<VecDeque<Result<T, VerifyError>>>, endpoint: &str) -> Result<T, VerifyError> {
    lock(queue)
        .pop_front()
        .unwrap_or_else(|| Err(VerifyError::Transport(format!("no scripted reply for {endpoint}"))))
}

impl RiskClient for ScriptedRiskClient {
    fn scan(&self, _payload: DeepScanPayload) -> ServiceFuture<ScanVerdict> {
        let reply = pop(&self.scans, SCAN_PATH);
        Box::pin(async move { reply })
    }

    fn validate(&self, _payload: PassivePayload) -> ServiceFuture<ValidateOutcome> {
        let reply = pop(&self.validations, VALIDATE_PATH);
        Box::pin(async move { reply })
    }

    fn login(&self, _payload: CredentialPayload) -> ServiceFuture<LoginOutcome> {
        let reply = pop(&self.logins, LOGIN_PATH);
        Box::pin(async move { reply })
    }
}

/// Offline client that applies the service's documented contract rules —
/// honeypot checks, required fields, a fixed credential table — without any
/// scoring model. A clean scan payload always verifies as human.
pub struct SimulatedRiskClient {
    username: String,
    password: String,
}

impl SimulatedRiskClient {
    /// Simulated service accepting exactly one credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl RiskClient for SimulatedRiskClient {
    fn scan(&self, payload: DeepScanPayload) -> ServiceFuture<ScanVerdict> {
        let verdict = if payload.honeypot_field.is_empty() {
            ScanVerdict::Human
        } else {
            ScanVerdict::Bot {
                reason: "Honeypot field was filled".to_string(),
            }
        };
        Box::pin(async move { Ok(verdict) })
    }

    fn validate(&self, payload: PassivePayload) -> ServiceFuture<ValidateOutcome> {
        let outcome = if !payload.honeypot_field.is_empty() || payload.honeypot_clicked {
            ValidateOutcome::Rejected {
                message: "Access Denied".to_string(),
            }
        } else if payload.username.is_empty() {
            ValidateOutcome::Rejected {
                message: "Username is missing".to_string(),
            }
        } else {
            ValidateOutcome::Accepted
        };
        Box::pin(async move { Ok(outcome) })
    }

    fn login(&self, payload: CredentialPayload) -> ServiceFuture<LoginOutcome> {
        let outcome = if payload.username == self.username && payload.password == self.password {
            LoginOutcome::Accepted {
                user: payload.username,
            }
        } else {
            LoginOutcome::Rejected {
                message: "Invalid credentials".to_string(),
            }
        };
        Box::pin(async move { Ok(outcome) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<T>(future: ServiceFuture<T>) -> Result<T, VerifyError> {
        // Scripted futures are immediately ready; poll them without a runtime.
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn noop_raw_waker() -> RawWaker {
            fn clone(_: *const ()) -> RawWaker {
                noop_raw_waker()
            }
            fn noop(_: *const ()) {}
            RawWaker::new(
                std::ptr::null(),
                &RawWakerVTable::new(clone, noop, noop, noop),
            )
        }

        let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
        let mut context = Context::from_waker(&waker);
        let mut future = future;
        match future.as_mut().poll(&mut context) {
            Poll::Ready(value) => value,
            Poll::Pending => panic!("scripted future was not ready"),
        }
    }

    fn empty_scan(honeypot: &str) -> DeepScanPayload {
        DeepScanPayload {
            mouse_data: vec![],
            typing_speed: vec![],
            honeypot_field: honeypot.to_string(),
        }
    }

    #[test]
    fn test_scripted_client_replays_in_order() {
        let client = ScriptedRiskClient::new();
        client.seed_scan(Ok(ScanVerdict::Human));
        client.seed_scan(Ok(ScanVerdict::Bot {
            reason: "second".to_string(),
        }));

        assert_eq!(block_on(client.scan(empty_scan(""))).unwrap(), ScanVerdict::Human);
        assert_eq!(
            block_on(client.scan(empty_scan(""))).unwrap(),
            ScanVerdict::Bot {
                reason: "second".to_string()
            }
        );
    }

    #[test]
    fn test_scripted_client_exhausted_is_transport_error() {
        let client = ScriptedRiskClient::new();
        let result = block_on(client.scan(empty_scan("")));
        assert!(matches!(result, Err(VerifyError::Transport(_))));
    }

    #[test]
    fn test_simulated_honeypot_rejections() {
        let client = SimulatedRiskClient::new("resident", "secret");

        let verdict = block_on(client.scan(empty_scan("I am a bot"))).unwrap();
        assert!(matches!(verdict, ScanVerdict::Bot { .. }));

        let outcome = block_on(client.validate(PassivePayload {
            username: "resident".to_string(),
            mouse_movements: 5,
            focus_events: 0,
            clipboard_actions: 0,
            form_autofill_patterns: true,
            honeypot_field: "I am a bot".to_string(),
            honeypot_clicked: false,
        }))
        .unwrap();
        assert_eq!(
            outcome,
            ValidateOutcome::Rejected {
                message: "Access Denied".to_string()
            }
        );
    }

    #[test]
    fn test_simulated_login_credential_table() {
        let client = SimulatedRiskClient::new("resident", "secret");

        let accepted = block_on(client.login(CredentialPayload {
            username: "resident".to_string(),
            password: "secret".to_string(),
        }))
        .unwrap();
        assert_eq!(
            accepted,
            LoginOutcome::Accepted {
                user: "resident".to_string()
            }
        );

        let rejected = block_on(client.login(CredentialPayload {
            username: "resident".to_string(),
            password: "wrong".to_string(),
        }))
        .unwrap();
        assert!(matches!(rejected, LoginOutcome::Rejected { .. }));
    }
}
