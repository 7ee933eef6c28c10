//! Interaction capture
//!
//! Maintains the bounded raw sample buffer and the event counters for one
//! session. The raw pointer buffer is NOT a sliding window: once it reaches
//! capacity it freezes at its first observations and later moves are
//! dropped. Derivation keeps running against the frozen buffer so the
//! visualization series never stalls.

use chrono::{DateTime, Utc};

use crate::features::{motion_magnitude, MotionTrace};
use crate::types::{MotionPoint, PointerSample};

/// Captures pointer motion, focus, clipboard, and keydown activity
#[derive(Debug, Clone)]
pub struct InteractionCapture {
    samples: Vec<PointerSample>,
    capacity: usize,
    pointer_event_count: u64,
    focus_count: u64,
    clipboard_count: u64,
    keydown_times: Vec<DateTime<Utc>>,
    trace: MotionTrace,
}

impl InteractionCapture {
    /// Create a capture with a raw buffer of `capacity` samples and a
    /// motion trace of `trace_window` points
    pub fn new(capacity: usize, trace_window: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            pointer_event_count: 0,
            focus_count: 0,
            clipboard_count: 0,
            keydown_times: Vec::new(),
            trace: MotionTrace::new(trace_window),
        }
    }

    /// Record a pointer move.
    ///
    /// The motion magnitude is always derived against the last captured
    /// sample and pushed to the trace, whether or not the raw buffer still
    /// has room. Returns true when the sample was captured (buffer not yet
    /// frozen) — captured samples are what qualify for the auto trigger.
    pub fn on_pointer_move(&mut self, x: f64, y: f64, now: DateTime<Utc>) -> bool {
        self.pointer_event_count += 1;
        let sample = PointerSample::new(x, y, now);
        let magnitude = motion_magnitude(&sample, self.samples.last());
        self.trace.push(MotionPoint {
            time: now,
            magnitude,
        });

        if self.samples.len() < self.capacity {
            self.samples.push(sample);
            true
        } else {
            false
        }
    }

    /// Record a focus change. The counter is unbounded and never resets.
    pub fn on_focus(&mut self) -> u64 {
        self.focus_count += 1;
        self.focus_count
    }

    /// Record a clipboard paste. The counter is unbounded and never resets.
    pub fn on_paste(&mut self) -> u64 {
        self.clipboard_count += 1;
        self.clipboard_count
    }

    /// Record a keydown timestamp for typing-interval derivation
    pub fn on_key_down(&mut self, now: DateTime<Utc>) {
        self.keydown_times.push(now);
    }

    /// Successive differences of keydown timestamps, in milliseconds
    pub fn typing_intervals(&self) -> Vec<i64> {
        self.keydown_times
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_milliseconds())
            .collect()
    }

    /// Credentials present without a single keydown or paste suggests the
    /// form was populated by automation rather than typed
    pub fn autofill_suspected(&self) -> bool {
        self.keydown_times.is_empty() && self.clipboard_count == 0
    }

    pub fn samples(&self) -> &[PointerSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// True once the raw buffer has reached capacity
    pub fn is_frozen(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Total pointer events observed, including ones dropped by the freeze
    pub fn pointer_event_count(&self) -> u64 {
        self.pointer_event_count
    }

    pub fn focus_count(&self) -> u64 {
        self.focus_count
    }

    pub fn clipboard_count(&self) -> u64 {
        self.clipboard_count
    }

    pub fn trace(&self) -> &MotionTrace {
        &self.trace
    }
}
