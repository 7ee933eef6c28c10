//! Motion feature derivation
//!
//! Derives the per-event motion magnitude from consecutive raw pointer
//! samples and maintains the bounded visualization series. The magnitude is
//! a positional displacement in pixels, deliberately NOT divided by elapsed
//! time: downstream consumers expect raw pixel-distance units, not a
//! velocity.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{MotionPoint, PointerSample};

/// Euclidean pixel distance between consecutive samples, rounded to the
/// nearest integer. Returns 0 when no previous sample exists.
pub fn motion_magnitude(current: &PointerSample, previous: Option<&PointerSample>) -> u32 {
    let Some(previous) = previous else {
        return 0;
    };
    let dx = current.x - previous.x;
    let dy = current.y - previous.y;
    (dx * dx + dy * dy).sqrt().round() as u32
}

/// Sliding window of derived motion points for the live chart.
///
/// A true FIFO window: appending beyond capacity evicts the oldest entry.
/// It keeps updating even after the raw sample buffer has frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionTrace {
    points: VecDeque<MotionPoint>,
    window: usize,
}

impl MotionTrace {
    /// Create a trace holding at most `window` points
    pub fn new(window: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Append a point, evicting the oldest beyond the window
    pub fn push(&mut self, point: MotionPoint) {
        self.points.push_back(point);
        while self.points.len() > self.window {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in arrival order, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &MotionPoint> {
        self.points.iter()
    }
}
