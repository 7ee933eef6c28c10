//! Session configuration
//!
//! Capture limits, trigger tuning, and the flow policy for one portal
//! session. Two deployment profiles exist for the raw sample buffer; the
//! remaining knobs default to the values the portal ships with.

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Raw pointer sample capacity for the standard profile
pub const STANDARD_SAMPLE_CAPACITY: usize = 50;

/// Raw pointer sample capacity for the extended profile
pub const EXTENDED_SAMPLE_CAPACITY: usize = 100;

/// Default motion trace window (points kept for visualization)
pub const DEFAULT_TRACE_WINDOW: usize = 20;

/// Default number of retained log feed entries
pub const DEFAULT_LOG_CAP: usize = 5;

/// Default sample count that must accumulate before the auto trigger arms
pub const DEFAULT_TRIGGER_THRESHOLD: usize = 10;

/// Default quiet period before the armed trigger fires, in milliseconds
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 2_500;

/// Which verification flow the session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPolicy {
    /// Single deep scan fired automatically after a quiet period
    AutoScan,
    /// Passive check, then credential login, then post-login deep scan
    CredentialGated,
}

/// Tuning for one verification session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Raw pointer buffer capacity; the buffer freezes once full
    pub sample_capacity: usize,
    /// Motion trace sliding window size
    pub trace_window: usize,
    /// Log feed retention cap
    pub log_cap: usize,
    /// Samples required before the auto trigger may arm
    pub trigger_threshold: usize,
    /// Pointer inactivity required before the armed trigger fires
    pub quiet_period_ms: u64,
    /// Flow the session runs
    pub flow: FlowPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::credential_gated()
    }
}

impl SessionConfig {
    /// Config for the auto-triggered single-scan flow
    pub fn auto_scan() -> Self {
        Self {
            sample_capacity: STANDARD_SAMPLE_CAPACITY,
            trace_window: DEFAULT_TRACE_WINDOW,
            log_cap: DEFAULT_LOG_CAP,
            trigger_threshold: DEFAULT_TRIGGER_THRESHOLD,
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            flow: FlowPolicy::AutoScan,
        }
    }

    /// Config for the credential-gated three-phase flow
    pub fn credential_gated() -> Self {
        Self {
            flow: FlowPolicy::CredentialGated,
            ..Self::auto_scan()
        }
    }

    /// Switch to the extended capture profile (larger raw buffer)
    pub fn with_extended_capture(mut self) -> Self {
        self.sample_capacity = EXTENDED_SAMPLE_CAPACITY;
        self
    }

    /// Reject configs that would disable a bounded buffer outright
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.sample_capacity == 0 {
            return Err(VerifyError::InvalidConfig(
                "sample_capacity must be greater than zero".to_string(),
            ));
        }
        if self.trace_window == 0 {
            return Err(VerifyError::InvalidConfig(
                "trace_window must be greater than zero".to_string(),
            ));
        }
        if self.log_cap == 0 {
            return Err(VerifyError::InvalidConfig(
                "log_cap must be greater than zero".to_string(),
            ));
        }
        if self.trigger_threshold == 0 {
            return Err(VerifyError::InvalidConfig(
                "trigger_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
