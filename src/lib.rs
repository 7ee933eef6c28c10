//! Trapgate - Passive behavioral verification engine for decoy login portals
//!
//! Trapgate distinguishes human visitors from automated agents by observing
//! low-level interaction signals before and during credential submission,
//! then sequencing a multi-phase verification protocol against a remote
//! risk-scoring service: capture → feature derivation → debounce-triggered
//! decision → phased endpoint calls.
//!
//! ## Modules
//!
//! - **Capture**: bounded raw sample buffers, counters, typing intervals
//! - **Features**: motion magnitudes and the visualization window
//! - **Verifier**: the sans-IO verification state machine
//! - **Service**: client side of the risk service contract
//! - **Runtime**: tokio drivers for live sessions and script replay

pub mod capture;
pub mod config;
pub mod error;
pub mod event;
pub mod features;
pub mod honeypot;
pub mod logfeed;
pub mod service;
pub mod types;
pub mod verifier;

#[cfg(feature = "http")]
pub mod runtime;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{FlowPolicy, SessionConfig};
pub use error::VerifyError;
pub use honeypot::{HoneypotField, HoneypotSensor, SharedHoneypotField};
pub use service::RiskClient;
pub use types::Status;
pub use verifier::{Command, Phase, PhaseReply, RequestToken, Verifier};

/// Trapgate version embedded in diagnostics and reports
pub const TRAPGATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for diagnostics and reports
pub const PRODUCER_NAME: &str = "trapgate";
